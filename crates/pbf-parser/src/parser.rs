use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use pbf_decoder::{Batch, BlobReader, DecodeError, DecodeOptions, Frame, decode_primitive_block};
use pbf_types::{Header, Node, Relation, Way};
use pbf_wire::{BlockKind, WireError};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::barrier::PhaseBarrier;
use crate::cancel::CancelToken;
use crate::config::ParserConfig;
use crate::error::ParseError;

/// Lifecycle of a [`Parser`].
///
/// ```text
///   Idle ──▶ HeaderRead ──▶ Streaming ──▶ Draining ──┬──▶ Done
///                                                    ├──▶ Cancelled
///                                                    └──▶ Failed
/// ```
///
/// `Draining` covers the time between the reader stopping and the last
/// worker exiting. A failure while reading the header goes straight to
/// `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseState {
    Idle,
    HeaderRead,
    Streaming,
    Draining,
    Done,
    Cancelled,
    Failed,
}

/// Concurrent decoder of one PBF stream.
///
/// A single reader pulls frames off the stream in order and hands each one
/// to an idle worker. Workers inflate and decode on the blocking pool and
/// push batches into the destinations of the [`ParserConfig`].
///
/// ```text
///                 ready slots (oneshot)
///            ┌───────────────────────────────┐
///            ▼                               │
///   ┌──────────────┐  Frame   ┌──────────┐   │   ┌──────────────┐
///   │ reader       │─────────▶│ worker 1 │───┴──▶│ coords       │
///   │ (BlobReader) │          │ worker 2 │──────▶│ nodes        │
///   │              │          │   ...    │──────▶│ ways         │
///   └──────────────┘          │ worker N │──────▶│ relations    │
///                             └──────────┘       └──────────────┘
///                                  │
///                        way / relation barriers
/// ```
///
/// The reader reads a frame only once a worker has offered a slot, so no
/// more than N blocks are ever in flight and no frame is read that will
/// not be dispatched.
///
/// # Example
///
/// ```rust,no_run
/// use pbf_parser::{Parser, ParserConfig};
/// use tokio::sync::mpsc;
///
/// # async fn run(file: tokio::fs::File) -> Result<(), pbf_parser::ParseError> {
/// let (ways_tx, mut ways_rx) = mpsc::channel(16);
/// let config = ParserConfig {
///     ways: Some(ways_tx),
///     ..ParserConfig::default()
/// };
/// let consumer = tokio::spawn(async move {
///     let mut count = 0;
///     while let Some(batch) = ways_rx.recv().await {
///         count += batch.len();
///     }
///     count
/// });
/// Parser::new(file, config).parse().await?;
/// println!("{} ways", consumer.await.unwrap());
/// # Ok(())
/// # }
/// ```
pub struct Parser<R> {
    reader: BlobReader<R>,
    config: ParserConfig,
    header: Option<Header>,
    state: ParseState,
}

impl<R: AsyncRead + Unpin + Send> Parser<R> {
    #[must_use]
    pub fn new(reader: R, config: ParserConfig) -> Self {
        Self {
            reader: BlobReader::new(reader),
            config,
            header: None,
            state: ParseState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// The configuration, including any destinations left open.
    #[must_use]
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Give back the configuration, e.g. to reuse kept-open destinations
    /// for another stream.
    #[must_use]
    pub fn into_config(self) -> ParserConfig {
        self.config
    }

    /// Read and decode the header block; later calls return the cached one.
    ///
    /// # Errors
    ///
    /// - [`ParseError::UnsupportedBlockType`] if the first block is not
    ///   `OSMHeader`.
    /// - [`ParseError::Framing`] if the stream is empty or the frame is
    ///   malformed.
    /// - [`ParseError::Decode`] if the header body does not decode.
    pub async fn header(&mut self) -> Result<&Header, ParseError> {
        let header = match self.header.take() {
            Some(header) => header,
            None => match self.read_header().await {
                Ok(header) => {
                    self.set_state(ParseState::HeaderRead);
                    header
                }
                Err(e) => {
                    self.set_state(ParseState::Failed);
                    return Err(e);
                }
            },
        };
        Ok(&*self.header.insert(header))
    }

    async fn read_header(&mut self) -> Result<Header, ParseError> {
        let frame = self
            .reader
            .next_frame()
            .await
            .map_err(|e| ParseError::framing(e, BlockKind::Header))?
            .ok_or(ParseError::Framing(WireError::UnexpectedEof { offset: 0 }))?;
        if frame.kind != BlockKind::Header {
            return Err(ParseError::UnsupportedBlockType {
                expected: BlockKind::Header,
                found: frame.kind.as_str().to_owned(),
            });
        }
        let block = frame.into_block()?;
        let header = Header::decode_body(&block.data).map_err(DecodeError::from)?;
        debug!(
            program = header.writing_program.as_deref().unwrap_or(""),
            required = ?header.required_features,
            "header decoded"
        );
        Ok(header)
    }

    /// Decode the rest of the stream into the configured destinations.
    ///
    /// # Errors
    ///
    /// See [`parse_until`](Self::parse_until).
    pub async fn parse(&mut self) -> Result<(), ParseError> {
        self.parse_until(&CancelToken::new()).await
    }

    /// Decode the rest of the stream, stopping early once `cancel` trips.
    ///
    /// Reads the header first if [`header`](Self::header) has not been
    /// called. Phase hooks are consumed by the first call. Unless
    /// `keep_open` is set, every destination is closed when the call
    /// returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// The first error recorded by the reader or any worker. Batches
    /// already delivered stay delivered; in-flight blocks are finished
    /// before the call returns.
    ///
    /// - [`ParseError::Cancelled`] when stopped through `cancel`.
    /// - [`ParseError::Framing`] / [`ParseError::UnsupportedBlockType`] for
    ///   a bad frame.
    /// - [`ParseError::Decode`] for a malformed block.
    /// - [`ParseError::DestinationClosed`] if a receiver went away.
    /// - [`ParseError::WorkerPanicked`] / [`ParseError::HookPanicked`].
    pub async fn parse_until(&mut self, cancel: &CancelToken) -> Result<(), ParseError> {
        let header = self.header().await.map(|_| ());
        let result = match header {
            Ok(()) => self.stream(cancel).await,
            Err(e) => Err(e),
        };
        if !self.config.keep_open {
            self.close_destinations();
        }
        result
    }

    /// Drop every destination sender held by the configuration.
    ///
    /// A receiver ends once all senders are gone, so this closes the
    /// destinations unless the caller kept clones of the senders.
    pub fn close_destinations(&mut self) {
        let closed = [
            self.config.coords.take().is_some(),
            self.config.nodes.take().is_some(),
            self.config.ways.take().is_some(),
            self.config.relations.take().is_some(),
        ];
        debug!(
            closed = closed.iter().filter(|c| **c).count(),
            "destinations closed"
        );
    }

    async fn stream(&mut self, cancel: &CancelToken) -> Result<(), ParseError> {
        self.set_state(ParseState::Streaming);

        let opts = self.config.decode_options();
        let workers = if opts.wants_any() {
            self.config.worker_count()
        } else {
            1
        };
        let shared = Arc::new(Shared {
            opts,
            outputs: Outputs {
                coords: self.config.coords.clone(),
                nodes: self.config.nodes.clone(),
                ways: self.config.ways.clone(),
                relations: self.config.relations.clone(),
            },
            way_barrier: self
                .config
                .on_first_way
                .take()
                .map(|hook| PhaseBarrier::new("ways", workers, Some(hook))),
            relation_barrier: self
                .config
                .on_first_relation
                .take()
                .map(|hook| PhaseBarrier::new("relations", workers, Some(hook))),
            errors: ErrorSlot::default(),
            halt: CancelToken::new(),
            batches: AtomicU64::new(0),
        });

        let blocks = if opts.wants_any() {
            self.dispatch(&shared, workers, cancel).await
        } else {
            let blocks = self.skim(&shared, cancel).await;
            let mut phase = Phase::Nodes;
            phase.advance(Phase::Relations, &shared).await;
            blocks
        };

        let outcome = match shared.errors.take() {
            Some(err) => Err(err),
            None => match shared.panicked_hook() {
                Some(phase) => Err(ParseError::HookPanicked { phase }),
                None => Ok(()),
            },
        };

        debug!(
            blocks,
            batches = shared.batches.load(Ordering::Relaxed),
            workers,
            frames = self.reader.frames_read(),
            bytes = self.reader.offset(),
            "parse finished"
        );
        drop(shared);

        self.set_state(match &outcome {
            Ok(()) => ParseState::Done,
            Err(e) if e.is_cancelled() => ParseState::Cancelled,
            Err(_) => ParseState::Failed,
        });
        outcome
    }

    /// Run the reader loop against `workers` decode tasks; returns the
    /// number of blocks handed off.
    async fn dispatch(&mut self, shared: &Arc<Shared>, workers: usize, cancel: &CancelToken) -> u64 {
        let (ready_tx, mut ready_rx) = mpsc::channel::<oneshot::Sender<Frame>>(workers);
        let mut tasks = JoinSet::new();
        for id in 0..workers {
            tasks.spawn(worker(id, Arc::clone(shared), ready_tx.clone()));
        }
        drop(ready_tx);

        let mut blocks = 0u64;
        loop {
            let slot = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    shared.errors.record(ParseError::Cancelled);
                    break;
                }
                () = shared.halt.cancelled() => break,
                slot = ready_rx.recv() => match slot {
                    Some(slot) => slot,
                    None => break,
                },
            };
            if cancel.is_cancelled() {
                shared.errors.record(ParseError::Cancelled);
                break;
            }

            let frame = match self.next_data_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    shared.fail(e);
                    break;
                }
            };
            if cancel.is_cancelled() {
                shared.errors.record(ParseError::Cancelled);
                break;
            }
            trace!(offset = frame.offset, "block dispatched");
            if slot.send(frame).is_err() {
                shared.fail(ParseError::WorkerPanicked(
                    "decode worker exited before taking a block".to_owned(),
                ));
                break;
            }
            blocks += 1;
        }

        drop(ready_rx);
        self.set_state(ParseState::Draining);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                shared.fail(ParseError::WorkerPanicked(e.to_string()));
            }
        }
        blocks
    }

    /// Read the remaining frames without decoding them, checking framing
    /// only; returns the number of data blocks seen.
    async fn skim(&mut self, shared: &Shared, cancel: &CancelToken) -> u64 {
        let mut blocks = 0u64;
        loop {
            if cancel.is_cancelled() {
                shared.errors.record(ParseError::Cancelled);
                break;
            }
            match self.next_data_frame().await {
                Ok(Some(_)) => blocks += 1,
                Ok(None) => break,
                Err(e) => {
                    shared.fail(e);
                    break;
                }
            }
        }
        self.set_state(ParseState::Draining);
        blocks
    }

    async fn next_data_frame(&mut self) -> Result<Option<Frame>, ParseError> {
        let frame = self.reader.next_frame().await?;
        match frame {
            Some(frame) if frame.kind != BlockKind::Data => Err(ParseError::UnsupportedBlockType {
                expected: BlockKind::Data,
                found: frame.kind.as_str().to_owned(),
            }),
            other => Ok(other),
        }
    }

    fn set_state(&mut self, state: ParseState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "parser state");
            self.state = state;
        }
    }
}

// ── Worker side ─────────────────────────────────────────────────────────

struct Outputs {
    coords: Option<mpsc::Sender<Vec<Node>>>,
    nodes: Option<mpsc::Sender<Vec<Node>>>,
    ways: Option<mpsc::Sender<Vec<Way>>>,
    relations: Option<mpsc::Sender<Vec<Relation>>>,
}

/// State shared by the reader and every worker of one call.
struct Shared {
    opts: DecodeOptions,
    outputs: Outputs,
    way_barrier: Option<PhaseBarrier>,
    relation_barrier: Option<PhaseBarrier>,
    errors: ErrorSlot,
    /// Tripped on the first failure so the reader stops dispatching.
    halt: CancelToken,
    batches: AtomicU64,
}

impl Shared {
    fn fail(&self, err: ParseError) {
        let message = err.to_string();
        if self.errors.record(err) {
            warn!(error = %message, "parse failed");
        }
        self.halt.cancel();
    }

    fn panicked_hook(&self) -> Option<&'static str> {
        [&self.way_barrier, &self.relation_barrier]
            .into_iter()
            .flatten()
            .find(|b| b.hook_panicked())
            .map(PhaseBarrier::phase)
    }

    async fn emit(&self, batch: Batch, phase: &mut Phase) -> Result<(), ParseError> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        match batch {
            Batch::Coords(nodes) => send(self.outputs.coords.as_ref(), nodes, "coords").await,
            Batch::Nodes(nodes) => send(self.outputs.nodes.as_ref(), nodes, "nodes").await,
            Batch::Ways(ways) => {
                phase.advance(Phase::Ways, self).await;
                send(self.outputs.ways.as_ref(), ways, "ways").await
            }
            Batch::Relations(relations) => {
                phase.advance(Phase::Relations, self).await;
                send(self.outputs.relations.as_ref(), relations, "relations").await
            }
        }
    }
}

async fn send<T>(
    tx: Option<&mpsc::Sender<Vec<T>>>,
    batch: Vec<T>,
    destination: &'static str,
) -> Result<(), ParseError> {
    let Some(tx) = tx else {
        return Ok(());
    };
    tx.send(batch)
        .await
        .map_err(|_| ParseError::DestinationClosed { destination })
}

/// Furthest phase a worker has emitted into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Nodes,
    Ways,
    Relations,
}

impl Phase {
    /// Move forward to `to`, passing every barrier in between.
    async fn advance(&mut self, to: Phase, shared: &Shared) {
        if *self < Phase::Ways && to >= Phase::Ways {
            if let Some(barrier) = &shared.way_barrier {
                barrier.rendezvous().await;
            }
        }
        if *self < Phase::Relations && to >= Phase::Relations {
            if let Some(barrier) = &shared.relation_barrier {
                barrier.rendezvous().await;
            }
        }
        if to > *self {
            *self = to;
        }
    }
}

async fn worker(id: usize, shared: Arc<Shared>, ready: mpsc::Sender<oneshot::Sender<Frame>>) {
    let mut phase = Phase::Nodes;
    let mut decoded = 0u64;
    loop {
        let (slot, frame_rx) = oneshot::channel();
        if ready.send(slot).await.is_err() {
            break;
        }
        let Ok(frame) = frame_rx.await else {
            break;
        };
        if let Err(e) = process(frame, &shared, &mut phase).await {
            shared.fail(e);
            break;
        }
        decoded += 1;
    }
    drop(ready);
    // Every worker must reach every barrier, or the others never pass it.
    phase.advance(Phase::Relations, &shared).await;
    trace!(worker = id, blocks = decoded, "worker exited");
}

async fn process(frame: Frame, shared: &Shared, phase: &mut Phase) -> Result<(), ParseError> {
    let opts = shared.opts;
    let batches = tokio::task::spawn_blocking(move || {
        let block = frame.into_block()?;
        decode_primitive_block(&block.data, &opts).map_err(ParseError::from)
    })
    .await
    .map_err(|e| ParseError::WorkerPanicked(e.to_string()))??;

    for batch in batches {
        shared.emit(batch, phase).await?;
    }
    Ok(())
}

/// Holds the first error of a call; later ones are dropped.
#[derive(Default)]
struct ErrorSlot(Mutex<Option<ParseError>>);

impl ErrorSlot {
    /// Returns `true` if `err` was the first.
    fn record(&self, err: ParseError) -> bool {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(err);
        true
    }

    fn take(&self) -> Option<ParseError> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbf_encoder::PbfEncoder;
    use pbf_types::{Member, MemberType, Tags};

    fn tagged(id: i64) -> Node {
        let mut tags = Tags::new();
        tags.insert("amenity".into(), "cafe".into());
        Node { id, tags, ..Node::default() }
    }

    fn fixture() -> Vec<u8> {
        PbfEncoder::new()
            .with_header(Header {
                writing_program: Some("parser-test".into()),
                required_features: vec!["OsmSchema-V0.6".into(), "DenseNodes".into()],
                ..Header::default()
            })
            .add_dense_nodes(vec![Node { id: 1, ..Node::default() }, tagged(2)])
            .add_dense_nodes(vec![Node { id: 3, ..Node::default() }])
            .add_ways(vec![Way { id: 10, refs: vec![1, 2, 3], ..Way::default() }])
            .add_relations(vec![Relation {
                id: 20,
                members: vec![Member { id: 10, member_type: MemberType::Way, role: "outer".into() }],
                ..Relation::default()
            }])
            .encode()
            .unwrap()
    }

    async fn drain<T>(rx: &mut mpsc::Receiver<Vec<T>>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(batch) = rx.recv().await {
            out.extend(batch);
        }
        out
    }

    #[tokio::test]
    async fn header_is_read_once_and_cached() {
        let bytes = fixture();
        let mut parser = Parser::new(&bytes[..], ParserConfig::default());
        assert_eq!(parser.state(), ParseState::Idle);
        let program = parser.header().await.unwrap().writing_program.clone();
        assert_eq!(program.as_deref(), Some("parser-test"));
        let offset = parser.reader.offset();
        assert!(parser.header().await.unwrap().requires("DenseNodes"));
        assert_eq!(parser.reader.offset(), offset);
        assert_eq!(parser.state(), ParseState::HeaderRead);
    }

    #[tokio::test]
    async fn data_block_first_is_rejected() {
        let bytes = PbfEncoder::new()
            .add_dense_nodes(vec![Node { id: 1, ..Node::default() }])
            .encode()
            .unwrap();
        let mut parser = Parser::new(&bytes[..], ParserConfig::default());
        let err = parser.parse().await.unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnsupportedBlockType { expected: BlockKind::Header, ref found } if found == "OSMData"
        ));
        assert_eq!(parser.state(), ParseState::Failed);
    }

    #[tokio::test]
    async fn empty_stream_has_no_header() {
        let mut parser = Parser::new(&b""[..], ParserConfig::default());
        assert!(matches!(parser.header().await, Err(ParseError::Framing(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_kind_reaches_its_destination() {
        let bytes = fixture();
        let (coords_tx, mut coords_rx) = mpsc::channel(16);
        let (nodes_tx, mut nodes_rx) = mpsc::channel(16);
        let (ways_tx, mut ways_rx) = mpsc::channel(16);
        let (relations_tx, mut relations_rx) = mpsc::channel(16);
        let config = ParserConfig {
            concurrency: 2,
            coords: Some(coords_tx),
            nodes: Some(nodes_tx),
            ways: Some(ways_tx),
            relations: Some(relations_tx),
            ..ParserConfig::default()
        };

        let mut parser = Parser::new(&bytes[..], config);
        parser.parse().await.unwrap();
        assert_eq!(parser.state(), ParseState::Done);

        let mut coords: Vec<_> = drain(&mut coords_rx).await.into_iter().map(|n| n.id).collect();
        coords.sort_unstable();
        assert_eq!(coords, vec![1, 3]);
        let nodes = drain(&mut nodes_rx).await;
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].tags["amenity"], "cafe");
        assert_eq!(drain(&mut ways_rx).await[0].refs, vec![1, 2, 3]);
        assert_eq!(drain(&mut relations_rx).await[0].members[0].role, "outer");
    }

    #[tokio::test]
    async fn no_destinations_still_validates_framing() {
        let mut bytes = fixture();
        let mut parser = Parser::new(&bytes[..], ParserConfig::default());
        parser.parse().await.unwrap();
        assert_eq!(parser.state(), ParseState::Done);

        bytes.extend([0, 0, 0, 9, 1]);
        let mut parser = Parser::new(&bytes[..], ParserConfig::default());
        assert!(matches!(
            parser.parse().await,
            Err(ParseError::Framing(WireError::UnexpectedEof { .. }))
        ));
    }

    #[tokio::test]
    async fn truncated_stream_fails_and_closes_destinations() {
        let mut bytes = fixture();
        bytes.extend([0, 0, 0, 9, 1]);
        let (ways_tx, mut ways_rx) = mpsc::channel(16);
        let config = ParserConfig {
            concurrency: 1,
            ways: Some(ways_tx),
            ..ParserConfig::default()
        };
        let mut parser = Parser::new(&bytes[..], config);
        assert!(matches!(parser.parse().await, Err(ParseError::Framing(_))));
        assert_eq!(parser.state(), ParseState::Failed);
        // every way decoded before the bad frame is delivered, then the end
        assert_eq!(drain(&mut ways_rx).await.len(), 1);
    }

    #[tokio::test]
    async fn header_block_mid_stream_is_rejected() {
        let mut encoder = PbfEncoder::new();
        encoder
            .with_header(Header {
                writing_program: Some("first".into()),
                ..Header::default()
            })
            .add_raw_payload(
                BlockKind::Header,
                Header {
                    writing_program: Some("second".into()),
                    ..Header::default()
                }
                .encode_body(),
            );
        let bytes = encoder.encode().unwrap();
        let (nodes_tx, _nodes_rx) = mpsc::channel(1);
        let config = ParserConfig {
            nodes: Some(nodes_tx),
            ..ParserConfig::default()
        };
        let mut parser = Parser::new(&bytes[..], config);
        assert!(matches!(
            parser.parse().await,
            Err(ParseError::UnsupportedBlockType { expected: BlockKind::Data, .. })
        ));
    }

    #[tokio::test]
    async fn keep_open_leaves_destinations_until_closed() {
        let bytes = fixture();
        let (ways_tx, mut ways_rx) = mpsc::channel(16);
        let config = ParserConfig {
            keep_open: true,
            ways: Some(ways_tx),
            ..ParserConfig::default()
        };
        let mut parser = Parser::new(&bytes[..], config);
        parser.parse().await.unwrap();

        assert_eq!(ways_rx.recv().await.map(|b| b.len()), Some(1));
        assert!(matches!(ways_rx.try_recv(), Err(mpsc::error::TryRecvError::Empty)));

        parser.close_destinations();
        assert!(ways_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_receiver_is_reported() {
        let bytes = fixture();
        let (ways_tx, ways_rx) = mpsc::channel(16);
        drop(ways_rx);
        let config = ParserConfig {
            ways: Some(ways_tx),
            ..ParserConfig::default()
        };
        let mut parser = Parser::new(&bytes[..], config);
        assert!(matches!(
            parser.parse().await,
            Err(ParseError::DestinationClosed { destination: "ways" })
        ));
    }

    #[tokio::test]
    async fn cancelled_before_start_dispatches_nothing() {
        let bytes = fixture();
        let (nodes_tx, mut nodes_rx) = mpsc::channel(16);
        let config = ParserConfig {
            nodes: Some(nodes_tx),
            ..ParserConfig::default()
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut parser = Parser::new(&bytes[..], config);
        let err = parser.parse_until(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(parser.state(), ParseState::Cancelled);
        assert!(nodes_rx.recv().await.is_none());
    }
}
