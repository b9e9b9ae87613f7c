//! Phase hooks and the ordering they guarantee.
//!
//! A single consumer task watches all four destinations plus a signal
//! channel fed by the hooks. When a hook fires the consumer first drains
//! whatever is already buffered, then records the phase change and lets
//! the hook return. For a kind-ordered input no batch of an earlier kind
//! may show up after that point, and no batch of a later kind before it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pbf_parser::{ParseError, Parser, ParserConfig, PhaseHook};
use pbf_tests::{Destinations, Extract, Sinks};
use pbf_types::ElementKind;
use pbf_wire::BlockKind;
use tokio::sync::{mpsc, oneshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    Batch(ElementKind),
    Phase(ElementKind),
}

type Signal = (ElementKind, oneshot::Sender<()>);

fn signalling_hook(kind: ElementKind, signals: mpsc::Sender<Signal>) -> PhaseHook {
    PhaseHook::new(move || async move {
        let (ack_tx, ack_rx) = oneshot::channel();
        if signals.send((kind, ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    })
}

async fn observe(extract: &Extract, concurrency: usize) -> Vec<Event> {
    let bytes = extract.build();
    let (coords_tx, mut coords_rx) = mpsc::channel::<Vec<pbf_types::Node>>(2);
    let (nodes_tx, mut nodes_rx) = mpsc::channel::<Vec<pbf_types::Node>>(2);
    let (ways_tx, mut ways_rx) = mpsc::channel::<Vec<pbf_types::Way>>(2);
    let (relations_tx, mut relations_rx) = mpsc::channel::<Vec<pbf_types::Relation>>(2);
    let (signal_tx, mut signal_rx) = mpsc::channel::<Signal>(1);

    let config = ParserConfig {
        concurrency,
        coords: Some(coords_tx),
        nodes: Some(nodes_tx),
        ways: Some(ways_tx),
        relations: Some(relations_tx),
        on_first_way: Some(signalling_hook(ElementKind::Way, signal_tx.clone())),
        on_first_relation: Some(signalling_hook(ElementKind::Relation, signal_tx)),
        ..ParserConfig::default()
    };

    let consumer = tokio::spawn(async move {
        let mut events = Vec::new();
        loop {
            tokio::select! {
                biased;
                Some(_) = coords_rx.recv() => events.push(Event::Batch(ElementKind::Node)),
                Some(_) = nodes_rx.recv() => events.push(Event::Batch(ElementKind::Node)),
                Some(_) = ways_rx.recv() => events.push(Event::Batch(ElementKind::Way)),
                Some(_) = relations_rx.recv() => events.push(Event::Batch(ElementKind::Relation)),
                Some((kind, ack)) = signal_rx.recv() => {
                    while coords_rx.try_recv().is_ok() {
                        events.push(Event::Batch(ElementKind::Node));
                    }
                    while nodes_rx.try_recv().is_ok() {
                        events.push(Event::Batch(ElementKind::Node));
                    }
                    if kind == ElementKind::Relation {
                        while ways_rx.try_recv().is_ok() {
                            events.push(Event::Batch(ElementKind::Way));
                        }
                    }
                    events.push(Event::Phase(kind));
                    let _ = ack.send(());
                }
                else => break,
            }
        }
        events
    });

    Parser::new(&bytes[..], config).parse().await.expect("parse succeeds");
    tokio::time::timeout(Duration::from_secs(10), consumer)
        .await
        .expect("consumer finishes")
        .expect("consumer task")
}

fn assert_phase_ordered(events: &[Event]) {
    let way_phase = events
        .iter()
        .position(|e| *e == Event::Phase(ElementKind::Way))
        .expect("way hook ran");
    let relation_phase = events
        .iter()
        .position(|e| *e == Event::Phase(ElementKind::Relation))
        .expect("relation hook ran");
    assert!(way_phase < relation_phase);

    for (i, event) in events.iter().enumerate() {
        if let Event::Batch(kind) = event {
            match kind {
                ElementKind::Node => assert!(i < way_phase, "node batch after way phase: {events:?}"),
                ElementKind::Way => assert!(
                    i > way_phase && i < relation_phase,
                    "way batch outside its phase: {events:?}"
                ),
                ElementKind::Relation => {
                    assert!(i > relation_phase, "early relation batch: {events:?}");
                }
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batches_respect_phase_boundaries() {
    let extract = Extract {
        node_blocks: 16,
        nodes_per_block: 20,
        way_blocks: 8,
        ways_per_block: 5,
        relation_blocks: 4,
        relations_per_block: 2,
        ..Extract::default()
    };
    for concurrency in [1, 2, 4, 8] {
        let events = observe(&extract, concurrency).await;
        assert_phase_ordered(&events);
        let relations = events
            .iter()
            .filter(|e| **e == Event::Batch(ElementKind::Relation))
            .count();
        assert_eq!(relations, extract.relation_blocks);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn more_workers_than_blocks_still_pass_barriers() {
    let extract = Extract {
        node_blocks: 1,
        way_blocks: 1,
        relation_blocks: 1,
        ..Extract::default()
    };
    let events = observe(&extract, 16).await;
    assert_phase_ordered(&events);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hooks_run_once_without_any_ways() {
    let extract = Extract {
        way_blocks: 0,
        relation_blocks: 0,
        ..Extract::default()
    };
    let runs = Arc::new(AtomicUsize::new(0));
    let counting = |runs: &Arc<AtomicUsize>| {
        let runs = Arc::clone(runs);
        PhaseHook::blocking(move || {
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };
    let mut config = ParserConfig {
        concurrency: 4,
        on_first_way: Some(counting(&runs)),
        on_first_relation: Some(counting(&runs)),
        ..ParserConfig::default()
    };
    let sinks = Sinks::attach(&mut config, Destinations::ALL, 4);
    let bytes = extract.build();
    Parser::new(&bytes[..], config).parse().await.unwrap();
    let out = sinks.collect().await;

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(out.node_ids().len(), extract.node_count());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hooks_run_even_when_a_block_fails() {
    let mut encoder = Extract::default().encoder();
    encoder.add_raw_payload(BlockKind::Data, vec![0x12, 0x7f]);
    let bytes = encoder.encode().unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let hook = {
        let runs = Arc::clone(&runs);
        PhaseHook::new(move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };
    let mut config = ParserConfig {
        on_first_relation: Some(hook),
        ..ParserConfig::default()
    };
    let sinks = Sinks::attach(&mut config, Destinations::ALL, 4);
    let err = Parser::new(&bytes[..], config).parse().await.unwrap_err();
    sinks.collect().await;

    assert!(matches!(err, ParseError::Decode(_)), "{err:?}");
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_hook_fails_the_parse_without_hanging() {
    let extract = Extract::default();
    let mut config = ParserConfig {
        concurrency: 3,
        on_first_way: Some(PhaseHook::blocking(|| panic!("consumer gave up"))),
        ..ParserConfig::default()
    };
    let sinks = Sinks::attach(&mut config, Destinations::ALL, 4);
    let bytes = extract.build();
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        Parser::new(&bytes[..], config).parse(),
    )
    .await
    .expect("parse finishes");
    let out = sinks.collect().await;

    assert!(matches!(result, Err(ParseError::HookPanicked { phase: "ways" })), "{result:?}");
    assert_eq!(out.ways.len(), extract.way_count());
}
