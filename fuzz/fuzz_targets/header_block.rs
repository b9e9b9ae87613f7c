#![no_main]

use libfuzzer_sys::fuzz_target;

// Fuzz target: Header::decode_body on an arbitrary inflated payload.
//
// Catches bugs in:
// - Nested bounding box parsing
// - Repeated feature strings with invalid UTF-8
// - Wire type confusion on replication fields
fuzz_target!(|data: &[u8]| {
    let _ = pbf_types::Header::decode_body(data);
});
