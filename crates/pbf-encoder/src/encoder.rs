use pbf_types::{Header, Node, Relation, Way};
use pbf_wire::blob::{Blob, BlobData, MAX_BLOB_SIZE, write_frame};
use pbf_wire::{BlockKind, compression};

use crate::block_writer::{BlockOptions, BlockWriter, Group};
use crate::error::EncodeError;

/// How blob payloads are stored on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    /// `raw` field, no compression.
    None,
    /// `zlib_data`, the format's traditional default.
    #[default]
    Zlib,
    /// `zstd_data`.
    Zstd,
}

/// PBF writer: builds a complete stream from typed entities.
///
/// Follows the builder pattern: `add_*` methods append one block each and
/// return `&mut Self` for chaining; [`encode`](Self::encode) serializes
/// everything.
///
/// ```rust
/// use pbf_encoder::{Compression, PbfEncoder};
/// use pbf_types::{Header, Node};
///
/// let bytes = PbfEncoder::new()
///     .with_header(Header::default())
///     .compression(Compression::Zstd)
///     .add_dense_nodes(vec![Node { id: 1, lat: 43.73, lon: 7.42, ..Node::default() }])
///     .encode()
///     .unwrap();
/// assert!(!bytes.is_empty());
/// ```
///
/// # Output layout
///
/// ```text
/// ┌──────────────────────────────┬─────────────────────────────────┐
/// │ OSMHeader frame (optional)   │ written first when a header set │
/// │ OSMData frame 0              │ one per add_* call              │
/// │ OSMData frame 1 ...          │                                 │
/// └──────────────────────────────┴─────────────────────────────────┘
/// ```
///
/// Blocks are emitted in the order they were added, so a caller that adds
/// node blocks, then way blocks, then relation blocks produces a
/// kind-ordered stream.
pub struct PbfEncoder {
    header: Option<Header>,
    compression: Compression,
    options: BlockOptions,
    blocks: Vec<PendingBlock>,
}

enum PendingBlock {
    Primitive {
        options: BlockOptions,
        groups: Vec<Group>,
    },
    Payload {
        kind: BlockKind,
        data: Vec<u8>,
    },
    Frame(Vec<u8>),
}

impl Default for PbfEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PbfEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: None,
            compression: Compression::default(),
            options: BlockOptions::default(),
            blocks: Vec::new(),
        }
    }

    /// Set the header block written at the start of the stream.
    pub fn with_header(&mut self, header: Header) -> &mut Self {
        self.header = Some(header);
        self
    }

    pub fn compression(&mut self, compression: Compression) -> &mut Self {
        self.compression = compression;
        self
    }

    /// Scaling used by blocks added after this call.
    pub fn block_options(&mut self, options: BlockOptions) -> &mut Self {
        self.options = options;
        self
    }

    // ── Block addition methods ──────────────────────────────────────────

    /// Add a block holding the given primitive groups.
    pub fn add_block(&mut self, groups: Vec<Group>) -> &mut Self {
        self.blocks.push(PendingBlock::Primitive {
            options: self.options,
            groups,
        });
        self
    }

    /// Add a block with one dense node group.
    pub fn add_dense_nodes(&mut self, nodes: Vec<Node>) -> &mut Self {
        self.add_block(vec![Group::DenseNodes(nodes)])
    }

    /// Add a block with one group of plain (non-dense) nodes.
    pub fn add_nodes(&mut self, nodes: Vec<Node>) -> &mut Self {
        self.add_block(vec![Group::Nodes(nodes)])
    }

    pub fn add_ways(&mut self, ways: Vec<Way>) -> &mut Self {
        self.add_block(vec![Group::Ways(ways)])
    }

    pub fn add_relations(&mut self, relations: Vec<Relation>) -> &mut Self {
        self.add_block(vec![Group::Relations(relations)])
    }

    /// Add a block whose payload is given verbatim. The payload is still
    /// framed and compressed; nothing checks that it parses.
    pub fn add_raw_payload(&mut self, kind: BlockKind, data: Vec<u8>) -> &mut Self {
        self.blocks.push(PendingBlock::Payload { kind, data });
        self
    }

    /// Append bytes to the stream as-is, without framing.
    pub fn add_raw_frame(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.blocks.push(PendingBlock::Frame(bytes));
        self
    }

    // ── Serialization ───────────────────────────────────────────────────

    /// Serialize the header and every added block.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::BlockTooLarge`] if a payload exceeds the blob limit.
    /// - [`EncodeError::Wire`] if compression fails.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();

        if let Some(header) = &self.header {
            out.extend(self.frame(BlockKind::Header, header.encode_body())?);
        }

        for block in &self.blocks {
            match block {
                PendingBlock::Primitive { options, groups } => {
                    let mut writer = BlockWriter::new(*options);
                    for group in groups {
                        writer.write_group(group);
                    }
                    out.extend(self.frame(BlockKind::Data, writer.finish())?);
                }
                PendingBlock::Payload { kind, data } => {
                    out.extend(self.frame(*kind, data.clone())?);
                }
                PendingBlock::Frame(bytes) => out.extend_from_slice(bytes),
            }
        }

        Ok(out)
    }

    fn frame(&self, kind: BlockKind, payload: Vec<u8>) -> Result<Vec<u8>, EncodeError> {
        if payload.len() > MAX_BLOB_SIZE {
            return Err(EncodeError::BlockTooLarge {
                size: payload.len(),
                limit: MAX_BLOB_SIZE,
            });
        }

        let blob = match self.compression {
            Compression::None => Blob {
                raw_size: None,
                data: BlobData::Raw(payload),
            },
            Compression::Zlib => Blob {
                raw_size: Some(payload.len()),
                data: BlobData::Zlib(compression::deflate_zlib(&payload)?),
            },
            Compression::Zstd => Blob {
                raw_size: Some(payload.len()),
                data: BlobData::Zstd(compression::compress_zstd(&payload)?),
            },
        };
        Ok(write_frame(kind, &blob))
    }
}
