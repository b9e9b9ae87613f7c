#![no_main]

use libfuzzer_sys::fuzz_target;
use pbf_wire::{FieldReader, WireType};

// Fuzz target: protobuf field walking.
//
// Reads every field and then every accessor that matches its wire type,
// including packed decoding of length-delimited fields.
fuzz_target!(|data: &[u8]| {
    let mut reader = FieldReader::new(data);
    while let Ok(Some(field)) = reader.next_field() {
        assert!(reader.position() <= data.len());
        match field.wire_type {
            WireType::Varint => {
                let _ = field.as_u64();
                let _ = field.as_sint64();
                let _ = field.as_i32();
            }
            WireType::LengthDelimited => {
                let _ = field.as_bytes();
                let mut values = Vec::new();
                let _ = field.extend_packed(&mut values, pbf_wire::varint::zigzag_decode);
            }
            _ => {}
        }
    }
});
