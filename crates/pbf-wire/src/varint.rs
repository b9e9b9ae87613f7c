use crate::error::WireError;

/// Maximum number of bytes a u64 varint can occupy.
/// ceil(64 / 7) = 10 bytes.
pub const MAX_VARINT_BYTES: usize = 10;

/// Encode a `u64` value as a protobuf base-128 varint into `buf`.
///
/// # Returns
///
/// The number of bytes written (1–10).
///
/// # Panics
///
/// Panics if `buf` is shorter than the required encoding length.
/// A [`MAX_VARINT_BYTES`] buffer is always sufficient.
///
/// | Value   | Encoded bytes        |
/// |---------|----------------------|
/// | 0       | `[0x00]`             |
/// | 127     | `[0x7F]`             |
/// | 128     | `[0x80, 0x01]`       |
/// | 300     | `[0xAC, 0x02]`       |
pub fn encode_varint(mut value: u64, buf: &mut [u8]) -> usize {
    let mut i = 0;
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf[i] = byte;
        i += 1;
        if value == 0 {
            return i;
        }
    }
}

/// Decode a base-128 varint from the front of `buf`.
///
/// # Returns
///
/// `(decoded_value, bytes_consumed)` on success.
///
/// # Errors
///
/// - [`WireError::VarintTooLong`] if more than 10 bytes carry the
///   continuation bit.
/// - [`WireError::UnexpectedEof`] if the slice ends mid-varint.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), WireError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_BYTES {
            return Err(WireError::VarintTooLong);
        }

        // The 10th byte only contributes the top bit of a u64; anything
        // above it is discarded the same way protobuf decoders do.
        result |= u64::from(byte & 0x7F).wrapping_shl(shift);
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(WireError::UnexpectedEof { offset: buf.len() })
}

/// Map a signed value onto the unsigned zigzag space used by `sint32`/`sint64`.
///
/// `0 → 0, -1 → 1, 1 → 2, -2 → 3, ...`
#[must_use]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[must_use]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u64) -> Vec<u8> {
        let mut buf = [0u8; MAX_VARINT_BYTES];
        let len = encode_varint(value, &mut buf);
        buf[..len].to_vec()
    }

    #[test]
    fn encode_single_and_multi_byte() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(127), vec![0x7F]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xAC, 0x02]);
        assert_eq!(encode(u64::MAX).len(), MAX_VARINT_BYTES);
    }

    #[test]
    fn decode_boundary_values() {
        for value in [0, 1, 127, 128, 16_384, u64::from(u32::MAX), u64::MAX] {
            let encoded = encode(value);
            let (decoded, consumed) = decode_varint(&encoded).unwrap();
            assert_eq!(decoded, value, "mismatch for {value}");
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn negative_int32_is_sign_extended_to_ten_bytes() {
        // protobuf writes int32 -1 as a 10-byte varint of u64::MAX
        let encoded = encode(-1i64 as u64);
        assert_eq!(encoded.len(), 10);
        let (decoded, _) = decode_varint(&encoded).unwrap();
        assert_eq!(decoded as i32, -1);
    }

    #[test]
    fn decode_leaves_trailing_bytes() {
        let (value, consumed) = decode_varint(&[0xAC, 0x02, 0xFF]).unwrap();
        assert_eq!(value, 300);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn decode_truncated_and_empty() {
        assert!(matches!(
            decode_varint(&[]),
            Err(WireError::UnexpectedEof { offset: 0 })
        ));
        assert!(matches!(
            decode_varint(&[0x80, 0x80]),
            Err(WireError::UnexpectedEof { offset: 2 })
        ));
    }

    #[test]
    fn decode_too_long() {
        assert!(matches!(
            decode_varint(&[0x80; 11]),
            Err(WireError::VarintTooLong)
        ));
    }

    #[test]
    fn zigzag_maps_small_magnitudes_to_small_codes() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(i64::MIN), u64::MAX);
        for v in [0, -1, 1, 437_370_125, -7_422_028, i64::MAX, i64::MIN] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }
}
