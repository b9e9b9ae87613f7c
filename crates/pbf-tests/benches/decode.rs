use pbf_decoder::{DecodeOptions, NodeRouting, decode_primitive_block};
use pbf_encoder::Compression;
use pbf_parser::{Parser, ParserConfig};
use pbf_tests::{Destinations, Extract, Sinks};
use pbf_wire::blob::read_frame;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

fn extract() -> Extract {
    Extract {
        node_blocks: 32,
        nodes_per_block: 8000,
        way_blocks: 8,
        ways_per_block: 2000,
        relation_blocks: 2,
        relations_per_block: 500,
        ..Extract::default()
    }
}

/// First data block of `bytes`, inflated.
fn first_data_block(bytes: &[u8]) -> Vec<u8> {
    let (_, used) = read_frame(bytes).unwrap().unwrap();
    let (block, _) = read_frame(&bytes[used..]).unwrap().unwrap();
    block.data
}

fn bench_dense_block(c: &mut Criterion) {
    let payload = first_data_block(&extract().build());
    let mut group = c.benchmark_group("dense_block");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for (name, include_metadata) in [("plain", false), ("metadata", true)] {
        let opts = DecodeOptions {
            include_metadata,
            nodes: NodeRouting::Split,
            ways: true,
            relations: true,
        };
        group.bench_function(name, |b| {
            b.iter(|| decode_primitive_block(&payload, &opts).unwrap());
        });
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let bytes = extract().build();

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.sample_size(10);

    for concurrency in [1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, &concurrency| {
                b.iter(|| {
                    runtime.block_on(async {
                        let mut config = ParserConfig {
                            concurrency,
                            ..ParserConfig::default()
                        };
                        let sinks = Sinks::attach(&mut config, Destinations::ALL, 16);
                        Parser::new(&bytes[..], config).parse().await.unwrap();
                        sinks.collect().await
                    })
                });
            },
        );
    }
    group.finish();
}

fn bench_compression(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("parse_compression");
    group.sample_size(10);

    for compression in [Compression::None, Compression::Zlib, Compression::Zstd] {
        let bytes = Extract {
            compression,
            ..extract()
        }
        .build();
        group.bench_function(format!("{compression:?}"), |b| {
            b.iter(|| {
                runtime.block_on(async {
                    let mut config = ParserConfig::default();
                    let sinks = Sinks::attach(&mut config, Destinations::ALL, 16);
                    Parser::new(&bytes[..], config).parse().await.unwrap();
                    sinks.collect().await
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dense_block, bench_parse, bench_compression);
criterion_main!(benches);
