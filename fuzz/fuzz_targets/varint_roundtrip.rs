#![no_main]

use libfuzzer_sys::fuzz_target;

// Fuzz target: varint and zigzag encode->decode roundtrip.
//
// Takes 8 bytes of fuzz input, interprets them as an i64, zigzag-encodes
// it, writes it as a LEB128 varint, decodes both layers and asserts the
// value survives.
fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }
    let value = i64::from_le_bytes(data[..8].try_into().unwrap());

    let mut buf = [0u8; 10];
    let encoded_len = pbf_wire::varint::encode_varint(pbf_wire::varint::zigzag_encode(value), &mut buf);

    let (decoded, decoded_len) = pbf_wire::varint::decode_varint(&buf[..encoded_len]).unwrap();
    assert_eq!(pbf_wire::varint::zigzag_decode(decoded), value);
    assert_eq!(decoded_len, encoded_len);
});
