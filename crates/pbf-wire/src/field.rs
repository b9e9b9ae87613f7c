use crate::error::WireError;
use crate::varint::{MAX_VARINT_BYTES, decode_varint, encode_varint, zigzag_decode, zigzag_encode};

/// Protobuf wire types.
///
/// Every field in a message starts with a key varint:
///
/// ```text
///   key = (field_number << 3) | wire_type
/// ```
///
/// ```text
/// ┌──────┬─────────────────┬─────────────────────────────────┐
/// │ Wire │ Type            │ Payload format                  │
/// ├──────┼─────────────────┼─────────────────────────────────┤
/// │ 0    │ Varint          │ Single varint value             │
/// │ 1    │ Fixed64         │ 8 little-endian bytes           │
/// │ 2    │ LengthDelimited │ Varint length + raw bytes       │
/// │ 5    │ Fixed32         │ 4 little-endian bytes           │
/// └──────┴─────────────────┴─────────────────────────────────┘
/// ```
///
/// Groups (3 and 4) are deprecated and never appear in PBF files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    /// Convert the low three bits of a field key.
    ///
    /// # Errors
    ///
    /// [`WireError::UnsupportedWireType`] for group or unknown wire types.
    pub fn from_raw(value: u64) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            other => Err(WireError::UnsupportedWireType { value: other }),
        }
    }
}

// ── Decoding ──────────────────────────────────────────────────────────

/// A raw field before type-specific interpretation.
///
/// For `Varint` fields `data` holds the varint bytes; for `Fixed64` and
/// `Fixed32` the 8 or 4 payload bytes; for `LengthDelimited` the payload
/// after the length prefix.
#[derive(Clone, Copy, Debug)]
pub struct RawField<'a> {
    pub number: u32,
    pub wire_type: WireType,
    pub data: &'a [u8],
}

impl<'a> RawField<'a> {
    fn expect(&self, expected: WireType) -> Result<(), WireError> {
        if self.wire_type == expected {
            Ok(())
        } else {
            Err(WireError::WireTypeMismatch {
                field: self.number,
                expected,
                found: self.wire_type,
            })
        }
    }

    /// Read a `uint64`/`uint32`/`enum`/`bool` varint payload.
    ///
    /// # Errors
    ///
    /// [`WireError::WireTypeMismatch`] if the field is not a varint.
    pub fn as_u64(&self) -> Result<u64, WireError> {
        self.expect(WireType::Varint)?;
        Ok(decode_varint(self.data)?.0)
    }

    /// Read an `int64` payload (two's complement in a varint).
    ///
    /// # Errors
    ///
    /// [`WireError::WireTypeMismatch`] if the field is not a varint.
    pub fn as_i64(&self) -> Result<i64, WireError> {
        Ok(self.as_u64()? as i64)
    }

    /// Read an `int32` payload; negative values arrive sign-extended.
    ///
    /// # Errors
    ///
    /// [`WireError::WireTypeMismatch`] if the field is not a varint.
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i32(&self) -> Result<i32, WireError> {
        Ok(self.as_u64()? as i32)
    }

    /// Read a `sint64`/`sint32` zigzag payload.
    ///
    /// # Errors
    ///
    /// [`WireError::WireTypeMismatch`] if the field is not a varint.
    pub fn as_sint64(&self) -> Result<i64, WireError> {
        Ok(zigzag_decode(self.as_u64()?))
    }

    /// Read a `bytes`/`string`/embedded-message payload.
    ///
    /// # Errors
    ///
    /// [`WireError::WireTypeMismatch`] if the field is not length-delimited.
    pub fn as_bytes(&self) -> Result<&'a [u8], WireError> {
        self.expect(WireType::LengthDelimited)?;
        Ok(self.data)
    }

    /// Append every varint of a repeated scalar field to `out`.
    ///
    /// Accepts both the packed encoding (one length-delimited field holding
    /// consecutive varints) and the unpacked one (one varint field per
    /// element, so this is called once per occurrence). `map` converts the
    /// raw varint, e.g. [`zigzag_decode`] for `sint64` columns.
    ///
    /// # Errors
    ///
    /// Malformed varints inside the packed payload, or a fixed-width wire type.
    pub fn extend_packed<T>(
        &self,
        out: &mut Vec<T>,
        map: impl Fn(u64) -> T,
    ) -> Result<(), WireError> {
        match self.wire_type {
            WireType::Varint => {
                out.push(map(decode_varint(self.data)?.0));
                Ok(())
            }
            WireType::LengthDelimited => {
                let mut buf = self.data;
                while !buf.is_empty() {
                    let (value, n) = decode_varint(buf)?;
                    out.push(map(value));
                    buf = &buf[n..];
                }
                Ok(())
            }
            other => Err(WireError::WireTypeMismatch {
                field: self.number,
                expected: WireType::LengthDelimited,
                found: other,
            }),
        }
    }
}

/// Cursor-based field reader for one protobuf message.
///
/// ```text
///   let mut reader = FieldReader::new(body);
///   while let Some(field) = reader.next_field()? {
///       match field.number {
///           1 => { /* handle field 1 */ }
///           _ => { /* unknown fields are skipped for free */ }
///       }
///   }
/// ```
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Read the next field of the message.
    ///
    /// Returns `Ok(None)` once the buffer is exhausted.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the key or payload is malformed or
    /// truncated. The offset in `UnexpectedEof` is relative to the start of
    /// this message.
    pub fn next_field(&mut self) -> Result<Option<RawField<'a>>, WireError> {
        let remaining = &self.buf[self.pos..];
        if remaining.is_empty() {
            return Ok(None);
        }

        let (key, key_len) = decode_varint(remaining).map_err(|e| self.relocate(e))?;
        let wire_type = WireType::from_raw(key & 0x7)?;
        let number = u32::try_from(key >> 3).map_err(|_| WireError::UnsupportedWireType { value: key })?;
        let payload = &remaining[key_len..];

        let (data, consumed) = match wire_type {
            WireType::Varint => {
                let (_, n) = decode_varint(payload).map_err(|e| self.relocate(e))?;
                (&payload[..n], n)
            }
            WireType::Fixed64 => (self.take_fixed(payload, key_len, 8)?, 8),
            WireType::Fixed32 => (self.take_fixed(payload, key_len, 4)?, 4),
            WireType::LengthDelimited => {
                let (len, n) = decode_varint(payload).map_err(|e| self.relocate(e))?;
                let end = usize::try_from(len)
                    .ok()
                    .and_then(|len| n.checked_add(len))
                    .filter(|&end| end <= payload.len())
                    .ok_or(WireError::UnexpectedEof {
                        offset: self.buf.len(),
                    })?;
                (&payload[n..end], end)
            }
        };

        self.pos += key_len + consumed;

        Ok(Some(RawField {
            number,
            wire_type,
            data,
        }))
    }

    fn take_fixed(
        &self,
        payload: &'a [u8],
        key_len: usize,
        width: usize,
    ) -> Result<&'a [u8], WireError> {
        payload.get(..width).ok_or(WireError::UnexpectedEof {
            offset: self.pos + key_len + payload.len(),
        })
    }

    fn relocate(&self, err: WireError) -> WireError {
        match err {
            WireError::UnexpectedEof { .. } => WireError::UnexpectedEof {
                offset: self.buf.len(),
            },
            other => other,
        }
    }

    /// Number of bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }
}

// ── Encoding ──────────────────────────────────────────────────────────
//
// Each helper appends one complete field (key + payload) to `buf`. The
// encoder crate builds whole messages out of these.

fn push_varint(buf: &mut Vec<u8>, value: u64) {
    let mut scratch = [0u8; MAX_VARINT_BYTES];
    let n = encode_varint(value, &mut scratch);
    buf.extend_from_slice(&scratch[..n]);
}

fn push_key(buf: &mut Vec<u8>, number: u32, wire_type: WireType) {
    push_varint(buf, (u64::from(number) << 3) | wire_type as u64);
}

/// Encode a `uint32`/`uint64`/`int64`/`enum`/`bool` field.
pub fn encode_varint_field(buf: &mut Vec<u8>, number: u32, value: u64) {
    push_key(buf, number, WireType::Varint);
    push_varint(buf, value);
}

/// Encode an `int32`/`int64` field. Negative values take 10 bytes.
pub fn encode_int_field(buf: &mut Vec<u8>, number: u32, value: i64) {
    encode_varint_field(buf, number, value as u64);
}

/// Encode a `sint32`/`sint64` field with zigzag encoding.
pub fn encode_sint_field(buf: &mut Vec<u8>, number: u32, value: i64) {
    encode_varint_field(buf, number, zigzag_encode(value));
}

/// Encode a `bytes`/`string`/embedded-message field.
pub fn encode_bytes_field(buf: &mut Vec<u8>, number: u32, data: &[u8]) {
    push_key(buf, number, WireType::LengthDelimited);
    push_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Encode a packed repeated varint field. Empty input writes nothing.
pub fn encode_packed_field(buf: &mut Vec<u8>, number: u32, values: impl IntoIterator<Item = u64>) {
    let mut packed = Vec::new();
    for value in values {
        push_varint(&mut packed, value);
    }
    if !packed.is_empty() {
        encode_bytes_field(buf, number, &packed);
    }
}
