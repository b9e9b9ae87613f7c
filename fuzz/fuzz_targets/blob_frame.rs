#![no_main]

use libfuzzer_sys::fuzz_target;

// Fuzz target: read_frame over an in-memory stream, frame after frame.
//
// Catches bugs in:
// - Length prefix and blob header size limits
// - Truncated headers and blobs
// - Unknown block types
// - zlib/zstd inflation of hostile payloads
fuzz_target!(|data: &[u8]| {
    let mut rest = data;
    while let Ok(Some((_, used))) = pbf_wire::blob::read_frame(rest) {
        rest = &rest[used..];
    }
});
