use std::num::NonZeroUsize;

use pbf_decoder::{DecodeOptions, NodeRouting};
use pbf_types::{Node, Relation, Way};
use tokio::sync::mpsc::Sender;

use crate::barrier::PhaseHook;

/// Configuration for one [`Parser`](crate::Parser).
///
/// ```text
/// ┌───────────────────┬──────────────────────────────────────────────────┐
/// │ Field             │ Purpose                                          │
/// ├───────────────────┼──────────────────────────────────────────────────┤
/// │ include_metadata  │ Attach version/user/timestamp to every entity    │
/// │ concurrency       │ Worker count; 0 means available parallelism      │
/// │ keep_open         │ Do not close destinations when a call ends       │
/// │ coords            │ Untagged nodes (all nodes if `nodes` is unset)   │
/// │ nodes             │ Tagged nodes (all nodes if `coords` is unset)    │
/// │ ways              │ Way batches                                      │
/// │ relations         │ Relation batches                                 │
/// │ on_first_way      │ Hook run once between the node and way phases    │
/// │ on_first_relation │ Hook run once between the way and relation phases│
/// └───────────────────┴──────────────────────────────────────────────────┘
/// ```
///
/// A destination left as `None` means its kind is never decoded. The
/// parser closes a destination by dropping its sender, so a receiver sees
/// the end of the stream once every other clone of that sender is gone
/// too.
///
/// Phase ordering holds only when the input stores all node blocks before
/// all way blocks before all relation blocks, and only across the hooks
/// that are set. Without hooks, batches of different kinds interleave.
#[derive(Debug, Default)]
pub struct ParserConfig {
    pub include_metadata: bool,
    pub concurrency: usize,
    pub keep_open: bool,
    pub coords: Option<Sender<Vec<Node>>>,
    pub nodes: Option<Sender<Vec<Node>>>,
    pub ways: Option<Sender<Vec<Way>>>,
    pub relations: Option<Sender<Vec<Relation>>>,
    pub on_first_way: Option<PhaseHook>,
    pub on_first_relation: Option<PhaseHook>,
}

impl ParserConfig {
    /// Number of decode workers a parse will start.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.concurrency > 0 {
            self.concurrency
        } else {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        }
    }

    /// What the workers decode, derived from which destinations are set.
    #[must_use]
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            include_metadata: self.include_metadata,
            nodes: NodeRouting::from_destinations(self.coords.is_some(), self.nodes.is_some()),
            ways: self.ways.is_some(),
            relations: self.relations.is_some(),
        }
    }
}
