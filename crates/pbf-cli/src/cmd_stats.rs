/// Implementation of `pbf stats`.
///
/// Decodes every block with the concurrent parser and prints entity
/// counts. Untagged and tagged nodes go to separate destinations so both
/// totals come out of one pass.
///
/// # Example output
///
/// ```text
/// File:      monaco.osm.pbf  (612394 bytes)
/// Program:   osmium/1.16.0
/// Workers:   8
///
/// Kind           Count      Tags
/// ──────────────────────────────
/// coords         30391         0
/// nodes           3917     11873
/// ways            5741     19402
/// relations        309      1788
/// ──────────────────────────────
/// Elapsed:   41 ms
/// ```
use std::collections::HashSet;
use std::time::Instant;

use anyhow::{Context, Result};
use pbf_parser::{Parser, ParserConfig, PhaseHook};
use pbf_types::{Metadata, Node, Relation, Tags, Way};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::StatsArgs;

/// Batches buffered per destination before workers wait on the consumer.
const CHANNEL_CAPACITY: usize = 64;

/// Per-destination totals.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub(crate) struct KindStats {
    pub count: u64,
    pub tags: u64,
    pub batches: u64,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct Report {
    pub file_size: u64,
    pub writing_program: Option<String>,
    pub workers: usize,
    pub coords: KindStats,
    pub nodes: KindStats,
    pub ways: KindStats,
    pub relations: KindStats,
    /// Distinct user names; present only with `--metadata`.
    pub users: Option<usize>,
    pub elapsed_ms: u128,
}

/// Entity fields the counters look at.
trait Entity: Send + 'static {
    fn tags(&self) -> &Tags;
    fn metadata(&self) -> Option<&Metadata>;
}

impl Entity for Node {
    fn tags(&self) -> &Tags {
        &self.tags
    }
    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }
}

impl Entity for Way {
    fn tags(&self) -> &Tags {
        &self.tags
    }
    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }
}

impl Entity for Relation {
    fn tags(&self) -> &Tags {
        &self.tags
    }
    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }
}

/// Drain one destination, returning its totals and the user names seen.
fn count<T: Entity>(mut rx: mpsc::Receiver<Vec<T>>) -> JoinHandle<(KindStats, HashSet<String>)> {
    tokio::spawn(async move {
        let mut stats = KindStats::default();
        let mut users = HashSet::new();
        while let Some(batch) = rx.recv().await {
            stats.batches += 1;
            stats.count += batch.len() as u64;
            for entity in &batch {
                stats.tags += entity.tags().len() as u64;
                if let Some(meta) = entity.metadata() {
                    if !meta.user.is_empty() && !users.contains(&meta.user) {
                        users.insert(meta.user.clone());
                    }
                }
            }
        }
        (stats, users)
    })
}

/// Run the `pbf stats` command.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or any block fails to
/// frame or decode.
pub async fn run(args: &StatsArgs, json: bool) -> Result<()> {
    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    let file_size = file.metadata().await?.len();

    let (coords_tx, coords_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (nodes_tx, nodes_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (ways_tx, ways_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (relations_tx, relations_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let config = ParserConfig {
        include_metadata: args.metadata,
        concurrency: args.concurrency,
        coords: (!args.skip_nodes).then_some(coords_tx),
        nodes: (!args.skip_nodes).then_some(nodes_tx),
        ways: Some(ways_tx),
        relations: Some(relations_tx),
        on_first_way: Some(PhaseHook::new(|| async { debug!("node phase complete") })),
        on_first_relation: Some(PhaseHook::new(|| async { debug!("way phase complete") })),
        ..ParserConfig::default()
    };
    let workers = config.worker_count();

    let counters = [count(coords_rx), count(nodes_rx)];
    let ways = count(ways_rx);
    let relations = count(relations_rx);

    let started = Instant::now();
    let mut parser = Parser::new(file, config);
    let writing_program = parser
        .header()
        .await
        .with_context(|| format!("failed to read header of {}", args.file.display()))?
        .writing_program
        .clone();
    parser
        .parse()
        .await
        .with_context(|| format!("failed to decode {}", args.file.display()))?;

    let mut users = HashSet::new();
    let mut totals = Vec::with_capacity(4);
    for handle in counters.into_iter().chain([ways, relations]) {
        let (stats, seen) = handle.await.context("counter task failed")?;
        users.extend(seen);
        totals.push(stats);
    }
    let mut totals = totals.into_iter();

    let report = Report {
        file_size,
        writing_program,
        workers,
        coords: totals.next().unwrap_or_default(),
        nodes: totals.next().unwrap_or_default(),
        ways: totals.next().unwrap_or_default(),
        relations: totals.next().unwrap_or_default(),
        users: args.metadata.then_some(users.len()),
        elapsed_ms: started.elapsed().as_millis(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&args.file.display().to_string(), &report));
    }
    Ok(())
}

pub(crate) fn render(name: &str, report: &Report) -> String {
    let sep = "─".repeat(30);
    let mut out = format!("File:      {name}  ({} bytes)\n", report.file_size);
    if let Some(program) = &report.writing_program {
        out += &format!("Program:   {program}\n");
    }
    out += &format!("Workers:   {}\n\n", report.workers);
    out += &format!("{:<10}{:>10}{:>10}\n{sep}\n", "Kind", "Count", "Tags");
    for (label, stats) in [
        ("coords", &report.coords),
        ("nodes", &report.nodes),
        ("ways", &report.ways),
        ("relations", &report.relations),
    ] {
        out += &format!("{label:<10}{:>10}{:>10}\n", stats.count, stats.tags);
    }
    out += &format!("{sep}\n");
    if let Some(users) = report.users {
        out += &format!("Users:     {users}\n");
    }
    out += &format!("Elapsed:   {} ms\n", report.elapsed_ms);
    out
}
