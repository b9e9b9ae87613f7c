#![no_main]

use libfuzzer_sys::fuzz_target;
use pbf_decoder::{DecodeOptions, NodeRouting};

// Fuzz target: decode_primitive_block with every kind and metadata wanted.
//
// Catches bugs in:
// - String table indices out of range
// - Dense column length mismatches and the keys_vals stream
// - Delta accumulation overflow
// - Unknown relation member types
fuzz_target!(|data: &[u8]| {
    let opts = DecodeOptions {
        include_metadata: true,
        nodes: NodeRouting::Split,
        ways: true,
        relations: true,
    };
    if let Ok(batches) = pbf_decoder::decode_primitive_block(data, &opts) {
        assert!(batches.iter().all(|b| !b.is_empty()));
    }
});
