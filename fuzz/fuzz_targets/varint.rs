#![no_main]

use libfuzzer_sys::fuzz_target;

// Fuzz target: decode_varint LEB128 codec.
//
// Catches bugs in:
// - VarintTooLong (>10 continuation bytes)
// - Zero-length input
// - Malformed continuation bits
fuzz_target!(|data: &[u8]| {
    if let Ok((value, len)) = pbf_wire::varint::decode_varint(data) {
        assert!(len <= 10 && len <= data.len());
        let _ = pbf_wire::varint::zigzag_decode(value);
    }
});
