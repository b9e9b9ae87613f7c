//! End-to-end decoding of synthetic extracts through the concurrent parser.
//!
//! Each test builds a kind-ordered extract with known counts, parses it
//! with real channel destinations and compares what the consumers saw.

use pbf_encoder::Compression;
use pbf_parser::{ParseState, Parser, ParserConfig};
use pbf_tests::{Destinations, Extract, RELATION_ID_BASE, Sinks, WAY_ID_BASE};
use pbf_types::MemberType;

async fn run(extract: &Extract, mut config: ParserConfig, which: Destinations) -> pbf_tests::Collected {
    let bytes = extract.build();
    let sinks = Sinks::attach(&mut config, which, 4);
    let mut parser = Parser::new(&bytes[..], config);
    parser.parse().await.expect("parse succeeds");
    assert_eq!(parser.state(), ParseState::Done);
    drop(parser);
    sinks.collect().await
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn split_routing_separates_tagged_nodes() {
    let extract = Extract::default();
    let out = run(&extract, ParserConfig::default(), Destinations::ALL).await;

    assert_eq!(out.coords.len(), extract.untagged_node_count());
    assert_eq!(out.nodes.len(), extract.tagged_node_count());
    assert!(out.coords.iter().all(|n| n.tags.is_empty()));
    assert!(out.nodes.iter().all(|n| n.tags.len() == 1));
    assert_eq!(out.node_ids(), (1..=extract.node_count() as i64).collect::<Vec<_>>());
    assert_eq!(out.ways.len(), extract.way_count());
    assert_eq!(out.relations.len(), extract.relation_count());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nodes_only_destination_receives_every_node() {
    let extract = Extract::default();
    let which = Destinations {
        nodes: true,
        ..Destinations::NONE
    };
    let out = run(&extract, ParserConfig::default(), which).await;
    assert_eq!(out.nodes.len(), extract.node_count());
    assert!(out.coords.is_empty() && out.ways.is_empty() && out.relations.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn coords_only_destination_keeps_tags() {
    let extract = Extract::default();
    let which = Destinations {
        coords: true,
        ..Destinations::NONE
    };
    let out = run(&extract, ParserConfig::default(), which).await;
    assert_eq!(out.coords.len(), extract.node_count());
    let tagged = out.coords.iter().filter(|n| !n.tags.is_empty()).count();
    assert_eq!(tagged, extract.tagged_node_count());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn skipped_kinds_are_not_delivered() {
    let extract = Extract::default();
    let which = Destinations {
        relations: true,
        ..Destinations::NONE
    };
    let out = run(&extract, ParserConfig::default(), which).await;
    assert_eq!(out.relations.len(), extract.relation_count());
    assert_eq!(out.batches, extract.relation_blocks);
}

// ── Concurrency ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn totals_do_not_depend_on_worker_count() {
    let extract = Extract {
        node_blocks: 12,
        nodes_per_block: 40,
        ..Extract::default()
    };
    for concurrency in [1, 2, 3, 8, 32] {
        let config = ParserConfig {
            concurrency,
            ..ParserConfig::default()
        };
        let out = run(&extract, config, Destinations::ALL).await;
        assert_eq!(out.node_ids().len(), extract.node_count(), "concurrency {concurrency}");
        assert_eq!(out.ways.len(), extract.way_count(), "concurrency {concurrency}");
        assert_eq!(out.relations.len(), extract.relation_count(), "concurrency {concurrency}");
    }
}

#[tokio::test]
async fn current_thread_runtime_is_enough() {
    let extract = Extract::default();
    let config = ParserConfig {
        concurrency: 4,
        ..ParserConfig::default()
    };
    let out = run(&extract, config, Destinations::ALL).await;
    assert_eq!(out.node_ids().len(), extract.node_count());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_compression_decodes_alike() {
    for compression in [Compression::None, Compression::Zlib, Compression::Zstd] {
        let extract = Extract {
            compression,
            ..Extract::default()
        };
        let out = run(&extract, ParserConfig::default(), Destinations::ALL).await;
        assert_eq!(out.node_ids().len(), extract.node_count(), "{compression:?}");
        assert_eq!(out.ways.len(), extract.way_count(), "{compression:?}");
    }
}

// ── Content ───────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn entities_survive_the_pipeline() {
    let extract = Extract::default();
    let out = run(&extract, ParserConfig::default(), Destinations::ALL).await;

    let node = out
        .coords
        .iter()
        .chain(&out.nodes)
        .find(|n| n.id == 10)
        .expect("node 10");
    let expected = extract.node(10);
    assert!((node.lat - expected.lat).abs() < 1e-7);
    assert!((node.lon - expected.lon).abs() < 1e-7);
    assert_eq!(node.tags, expected.tags);
    assert!(node.metadata.is_none());

    let way = out.ways.iter().find(|w| w.id == WAY_ID_BASE + 3).expect("way");
    assert_eq!(way.refs, extract.way(WAY_ID_BASE + 3).refs);
    assert_eq!(way.tags["highway"], "residential");

    let relation = out
        .relations
        .iter()
        .find(|r| r.id == RELATION_ID_BASE + 1)
        .expect("relation");
    let kinds: Vec<_> = relation.members.iter().map(|m| m.member_type).collect();
    assert_eq!(kinds, vec![MemberType::Way, MemberType::Node]);
    assert_eq!(relation.members[0].role, "outer");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn metadata_is_attached_only_when_requested() {
    let extract = Extract {
        metadata: true,
        ..Extract::default()
    };

    let out = run(&extract, ParserConfig::default(), Destinations::ALL).await;
    assert!(out.ways.iter().all(|w| w.metadata.is_none()));

    let config = ParserConfig {
        include_metadata: true,
        ..ParserConfig::default()
    };
    let out = run(&extract, config, Destinations::ALL).await;
    for node in out.coords.iter().chain(&out.nodes) {
        assert_eq!(node.metadata, extract.node(node.id).metadata, "node {}", node.id);
    }
    for way in &out.ways {
        assert_eq!(way.metadata, extract.way(way.id).metadata, "way {}", way.id);
    }
    for relation in &out.relations {
        assert_eq!(relation.metadata, extract.relation(relation.id).metadata);
    }
}

#[tokio::test]
async fn empty_extract_only_has_a_header() {
    let extract = Extract {
        node_blocks: 0,
        way_blocks: 0,
        relation_blocks: 0,
        ..Extract::default()
    };
    let out = run(&extract, ParserConfig::default(), Destinations::ALL).await;
    assert_eq!(out.batches, 0);
}
