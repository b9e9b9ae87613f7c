//! Synthetic fixtures and destination helpers shared by the integration
//! tests and benches.
//!
//! [`Extract`] describes a kind-ordered stream (all node blocks, then way
//! blocks, then relation blocks) and knows the exact counts a correct
//! decode produces, so tests can compare totals without golden files.

#![allow(clippy::pedantic)]

use pbf_encoder::{Compression, PbfEncoder};
use pbf_parser::ParserConfig;
use pbf_types::{BoundingBox, Header, Member, MemberType, Metadata, Node, Relation, Tags, Way};
use pbf_wire::blob::{Blob, BlobData, BlobHeader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ── Fixture description ─────────────────────────────────────────────────────

/// Shape of a synthetic extract.
///
/// Node ids run from 1, way ids from 1_000_000, relation ids from
/// 2_000_000. Every `tag_every`-th node (by id) carries one tag; 0 means
/// no node is tagged.
#[derive(Clone, Debug)]
pub struct Extract {
    pub node_blocks: usize,
    pub nodes_per_block: usize,
    pub way_blocks: usize,
    pub ways_per_block: usize,
    pub relation_blocks: usize,
    pub relations_per_block: usize,
    pub tag_every: usize,
    pub metadata: bool,
    pub compression: Compression,
}

impl Default for Extract {
    fn default() -> Self {
        Self {
            node_blocks: 6,
            nodes_per_block: 50,
            way_blocks: 4,
            ways_per_block: 20,
            relation_blocks: 2,
            relations_per_block: 5,
            tag_every: 5,
            metadata: false,
            compression: Compression::Zlib,
        }
    }
}

pub const WAY_ID_BASE: i64 = 1_000_000;
pub const RELATION_ID_BASE: i64 = 2_000_000;

impl Extract {
    pub fn node_count(&self) -> usize {
        self.node_blocks * self.nodes_per_block
    }

    pub fn tagged_node_count(&self) -> usize {
        if self.tag_every == 0 {
            0
        } else {
            self.node_count() / self.tag_every
        }
    }

    pub fn untagged_node_count(&self) -> usize {
        self.node_count() - self.tagged_node_count()
    }

    pub fn way_count(&self) -> usize {
        self.way_blocks * self.ways_per_block
    }

    pub fn relation_count(&self) -> usize {
        self.relation_blocks * self.relations_per_block
    }

    /// Header written at the start of every extract.
    pub fn header() -> Header {
        Header {
            bbox: Some(BoundingBox {
                left: 7.4,
                right: 7.44,
                top: 43.75,
                bottom: 43.72,
            }),
            required_features: vec!["OsmSchema-V0.6".into(), "DenseNodes".into()],
            optional_features: vec![],
            writing_program: Some("pbf-tests".into()),
            source: None,
            replication_timestamp: Some(1_700_000_000),
            replication_sequence: Some(4242),
            replication_base_url: None,
        }
    }

    pub fn node(&self, id: i64) -> Node {
        let mut tags = Tags::new();
        if self.tag_every != 0 && id % self.tag_every as i64 == 0 {
            tags.insert("amenity".into(), format!("bench-{id}"));
        }
        Node {
            id,
            lat: 43.7 + id as f64 * 1e-5,
            lon: 7.4 + id as f64 * 1e-5,
            tags,
            metadata: self.metadata.then(|| metadata(id)),
        }
    }

    pub fn way(&self, id: i64) -> Way {
        let first = (id - WAY_ID_BASE) % self.node_count().max(1) as i64 + 1;
        let mut tags = Tags::new();
        tags.insert("highway".into(), "residential".into());
        Way {
            id,
            refs: vec![first, first + 1, first + 2],
            tags,
            metadata: self.metadata.then(|| metadata(id)),
        }
    }

    pub fn relation(&self, id: i64) -> Relation {
        let mut tags = Tags::new();
        tags.insert("type".into(), "multipolygon".into());
        Relation {
            id,
            members: vec![
                Member {
                    id: WAY_ID_BASE + (id - RELATION_ID_BASE),
                    member_type: MemberType::Way,
                    role: "outer".into(),
                },
                Member {
                    id: 1,
                    member_type: MemberType::Node,
                    role: "label".into(),
                },
            ],
            tags,
            metadata: self.metadata.then(|| metadata(id)),
        }
    }

    /// An encoder loaded with the header and every block.
    pub fn encoder(&self) -> PbfEncoder {
        let mut encoder = PbfEncoder::new();
        encoder
            .with_header(Self::header())
            .compression(self.compression);

        let mut id = 1;
        for _ in 0..self.node_blocks {
            let nodes = (0..self.nodes_per_block)
                .map(|_| {
                    let node = self.node(id);
                    id += 1;
                    node
                })
                .collect();
            encoder.add_dense_nodes(nodes);
        }
        let mut id = WAY_ID_BASE;
        for _ in 0..self.way_blocks {
            let ways = (0..self.ways_per_block)
                .map(|_| {
                    let way = self.way(id);
                    id += 1;
                    way
                })
                .collect();
            encoder.add_ways(ways);
        }
        let mut id = RELATION_ID_BASE;
        for _ in 0..self.relation_blocks {
            let relations = (0..self.relations_per_block)
                .map(|_| {
                    let relation = self.relation(id);
                    id += 1;
                    relation
                })
                .collect();
            encoder.add_relations(relations);
        }
        encoder
    }

    pub fn build(&self) -> Vec<u8> {
        self.encoder().encode().expect("fixture encodes")
    }
}

fn metadata(id: i64) -> Metadata {
    Metadata {
        version: (id % 7) as i32 + 1,
        uid: (id % 3) as i32 + 100,
        user: format!("mapper{}", id % 3),
        timestamp: 1_600_000_000 + id,
        changeset: 90_000 + id,
    }
}

/// A complete frame whose blob header declares `block_type`, which need
/// not be a type the format knows.
pub fn foreign_frame(block_type: &str, payload: &[u8]) -> Vec<u8> {
    let blob = Blob {
        raw_size: None,
        data: BlobData::Raw(payload.to_vec()),
    }
    .encode();
    let header = BlobHeader {
        block_type: block_type.into(),
        index_data: None,
        data_size: blob.len(),
    }
    .encode();
    let mut frame = (header.len() as u32).to_be_bytes().to_vec();
    frame.extend(header);
    frame.extend(blob);
    frame
}

// ── Destinations ────────────────────────────────────────────────────────────

/// Everything a parse delivered, one `Vec` per destination, batches
/// flattened in arrival order.
#[derive(Debug, Default)]
pub struct Collected {
    pub coords: Vec<Node>,
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
    pub batches: usize,
}

impl Collected {
    /// Ids of all nodes from both node destinations, sorted.
    pub fn node_ids(&self) -> Vec<i64> {
        let mut ids: Vec<_> = self.coords.iter().chain(&self.nodes).map(|n| n.id).collect();
        ids.sort_unstable();
        ids
    }
}

/// Which destinations [`Sinks::attach`] wires up.
#[derive(Clone, Copy, Debug)]
pub struct Destinations {
    pub coords: bool,
    pub nodes: bool,
    pub ways: bool,
    pub relations: bool,
}

impl Destinations {
    pub const ALL: Self = Self {
        coords: true,
        nodes: true,
        ways: true,
        relations: true,
    };
    pub const NONE: Self = Self {
        coords: false,
        nodes: false,
        ways: false,
        relations: false,
    };
}

type Drain<T> = Option<JoinHandle<(Vec<T>, usize)>>;

/// Draining tasks behind the destinations of a [`ParserConfig`].
pub struct Sinks {
    coords: Drain<Node>,
    nodes: Drain<Node>,
    ways: Drain<Way>,
    relations: Drain<Relation>,
}

impl Sinks {
    /// Install channels of `capacity` for each selected destination and
    /// spawn a task draining each one.
    pub fn attach(config: &mut ParserConfig, which: Destinations, capacity: usize) -> Self {
        Self {
            coords: which.coords.then(|| wire(&mut config.coords, capacity)),
            nodes: which.nodes.then(|| wire(&mut config.nodes, capacity)),
            ways: which.ways.then(|| wire(&mut config.ways, capacity)),
            relations: which.relations.then(|| wire(&mut config.relations, capacity)),
        }
    }

    /// Wait for every destination to close and return what arrived.
    pub async fn collect(self) -> Collected {
        let mut out = Collected::default();
        if let Some(h) = self.coords {
            let (items, batches) = h.await.expect("drain task");
            out.coords = items;
            out.batches += batches;
        }
        if let Some(h) = self.nodes {
            let (items, batches) = h.await.expect("drain task");
            out.nodes = items;
            out.batches += batches;
        }
        if let Some(h) = self.ways {
            let (items, batches) = h.await.expect("drain task");
            out.ways = items;
            out.batches += batches;
        }
        if let Some(h) = self.relations {
            let (items, batches) = h.await.expect("drain task");
            out.relations = items;
            out.batches += batches;
        }
        out
    }
}

fn wire<T: Send + 'static>(
    slot: &mut Option<mpsc::Sender<Vec<T>>>,
    capacity: usize,
) -> JoinHandle<(Vec<T>, usize)> {
    let (tx, mut rx) = mpsc::channel(capacity);
    *slot = Some(tx);
    tokio::spawn(async move {
        let mut items = Vec::new();
        let mut batches = 0;
        while let Some(batch) = rx.recv().await {
            assert!(!batch.is_empty(), "empty batch delivered");
            batches += 1;
            items.extend(batch);
        }
        (items, batches)
    })
}
