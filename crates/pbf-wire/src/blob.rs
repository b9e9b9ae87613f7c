use std::fmt;

use crate::compression;
use crate::error::WireError;
use crate::field::{FieldReader, encode_bytes_field, encode_int_field};

/// Upper bound on a serialized `BlobHeader`, from the PBF format definition.
pub const MAX_BLOB_HEADER_SIZE: usize = 64 * 1024;

/// Upper bound on a blob, both as stored and once inflated.
pub const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;

/// Size of the big-endian length prefix in front of every `BlobHeader`.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// The two block types a PBF stream may contain.
///
/// The `type` string of the blob header selects how the payload is read:
/// `OSMHeader` carries a `HeaderBlock`, `OSMData` a `PrimitiveBlock`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Header,
    Data,
}

impl BlockKind {
    /// Parse the blob header `type` string.
    ///
    /// # Errors
    ///
    /// [`WireError::UnsupportedBlockType`] for any other string.
    pub fn from_type_str(value: &str) -> Result<Self, WireError> {
        match value {
            "OSMHeader" => Ok(Self::Header),
            "OSMData" => Ok(Self::Data),
            other => Err(WireError::UnsupportedBlockType {
                found: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header => "OSMHeader",
            Self::Data => "OSMData",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame envelope: the message between the length prefix and the blob.
///
/// ```text
/// ┌──────────┬───────────┬────────────┬───────────────────────────────┐
/// │ Field ID │ Wire Type │ Name       │ Description                   │
/// ├──────────┼───────────┼────────────┼───────────────────────────────┤
/// │ 1        │ LEN       │ type       │ "OSMHeader" or "OSMData"      │
/// │ 2        │ LEN       │ indexdata  │ Opaque, optional              │
/// │ 3        │ Varint    │ datasize   │ Byte length of the next Blob  │
/// └──────────┴───────────┴────────────┴───────────────────────────────┘
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobHeader {
    pub block_type: String,
    pub index_data: Option<Vec<u8>>,
    pub data_size: usize,
}

impl BlobHeader {
    /// # Errors
    ///
    /// Field-level [`WireError`]s, [`WireError::MissingField`] when `type`
    /// or `datasize` is absent, [`WireError::BlobTooLarge`] when `datasize`
    /// is negative or above [`MAX_BLOB_SIZE`].
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut block_type = None;
        let mut index_data = None;
        let mut data_size = None;

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => block_type = Some(String::from_utf8_lossy(field.as_bytes()?).into_owned()),
                2 => index_data = Some(field.as_bytes()?.to_vec()),
                3 => data_size = Some(field.as_i32()?),
                _ => {}
            }
        }

        let data_size = data_size.ok_or(WireError::MissingField {
            message: "BlobHeader",
            field: "datasize",
        })?;
        let data_size = usize::try_from(data_size)
            .ok()
            .filter(|&size| size <= MAX_BLOB_SIZE)
            .ok_or(WireError::BlobTooLarge {
                size: data_size.unsigned_abs() as usize,
                limit: MAX_BLOB_SIZE,
            })?;

        Ok(Self {
            block_type: block_type.ok_or(WireError::MissingField {
                message: "BlobHeader",
                field: "type",
            })?,
            index_data,
            data_size,
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 1, self.block_type.as_bytes());
        if let Some(index) = &self.index_data {
            encode_bytes_field(&mut buf, 2, index);
        }
        encode_int_field(&mut buf, 3, self.data_size as i64);
        buf
    }
}

/// How a blob stores its payload. Exactly one variant is present per blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobData {
    Raw(Vec<u8>),
    Zlib(Vec<u8>),
    Lzma(Vec<u8>),
    Bzip2(Vec<u8>),
    Lz4(Vec<u8>),
    Zstd(Vec<u8>),
}

/// The payload container that follows each `BlobHeader`.
///
/// ```text
/// ┌──────────┬───────────┬────────────┬───────────────────────────────┐
/// │ Field ID │ Wire Type │ Name       │ Description                   │
/// ├──────────┼───────────┼────────────┼───────────────────────────────┤
/// │ 1        │ LEN       │ raw        │ Uncompressed payload          │
/// │ 2        │ Varint    │ raw_size   │ Inflated size                 │
/// │ 3        │ LEN       │ zlib_data  │ zlib stream                   │
/// │ 4        │ LEN       │ lzma_data  │ unsupported                   │
/// │ 5        │ LEN       │ bzip2_data │ obsolete, unsupported         │
/// │ 6        │ LEN       │ lz4_data   │ unsupported                   │
/// │ 7        │ LEN       │ zstd_data  │ zstd frame                    │
/// └──────────┴───────────┴────────────┴───────────────────────────────┘
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub raw_size: Option<usize>,
    pub data: BlobData,
}

impl Blob {
    /// # Errors
    ///
    /// Field-level [`WireError`]s, or [`WireError::MissingField`] when no
    /// payload variant is present.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut raw_size = None;
        let mut data = None;

        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                2 => {
                    let size = field.as_i32()?;
                    raw_size = Some(usize::try_from(size).map_err(|_| WireError::BlobTooLarge {
                        size: size.unsigned_abs() as usize,
                        limit: MAX_BLOB_SIZE,
                    })?);
                }
                1 => data = Some(BlobData::Raw(field.as_bytes()?.to_vec())),
                3 => data = Some(BlobData::Zlib(field.as_bytes()?.to_vec())),
                4 => data = Some(BlobData::Lzma(field.as_bytes()?.to_vec())),
                5 => data = Some(BlobData::Bzip2(field.as_bytes()?.to_vec())),
                6 => data = Some(BlobData::Lz4(field.as_bytes()?.to_vec())),
                7 => data = Some(BlobData::Zstd(field.as_bytes()?.to_vec())),
                _ => {}
            }
        }

        Ok(Self {
            raw_size,
            data: data.ok_or(WireError::MissingField {
                message: "Blob",
                field: "data",
            })?,
        })
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let (number, payload) = match &self.data {
            BlobData::Raw(d) => (1, d),
            BlobData::Zlib(d) => (3, d),
            BlobData::Lzma(d) => (4, d),
            BlobData::Bzip2(d) => (5, d),
            BlobData::Lz4(d) => (6, d),
            BlobData::Zstd(d) => (7, d),
        };
        if let Some(size) = self.raw_size {
            encode_int_field(&mut buf, 2, size as i64);
        }
        encode_bytes_field(&mut buf, number, payload);
        buf
    }

    /// Inflate the payload into the serialized block message.
    ///
    /// # Errors
    ///
    /// - [`WireError::UnsupportedCompression`] for lzma, bzip2 and lz4.
    /// - [`WireError::BlobTooLarge`] if `raw_size` or the inflated output
    ///   exceeds [`MAX_BLOB_SIZE`].
    /// - [`WireError::DecompressFailed`] if the stream is corrupt.
    /// - [`WireError::SizeMismatch`] if the output disagrees with `raw_size`.
    pub fn into_payload(self) -> Result<Vec<u8>, WireError> {
        if let Some(size) = self.raw_size.filter(|&size| size > MAX_BLOB_SIZE) {
            return Err(WireError::BlobTooLarge {
                size,
                limit: MAX_BLOB_SIZE,
            });
        }

        let inflated = match self.data {
            BlobData::Raw(data) => return Ok(data),
            BlobData::Zlib(data) => compression::inflate_zlib(&data, MAX_BLOB_SIZE)?,
            BlobData::Zstd(data) => compression::inflate_zstd(&data, MAX_BLOB_SIZE)?,
            BlobData::Lzma(_) => return Err(WireError::UnsupportedCompression { codec: "lzma" }),
            BlobData::Bzip2(_) => return Err(WireError::UnsupportedCompression { codec: "bzip2" }),
            BlobData::Lz4(_) => return Err(WireError::UnsupportedCompression { codec: "lz4" }),
        };

        match self.raw_size {
            Some(declared) if declared != inflated.len() => Err(WireError::SizeMismatch {
                declared,
                actual: inflated.len(),
            }),
            _ => Ok(inflated),
        }
    }
}

/// One framed block with its payload inflated and its kind resolved.
///
/// The framer produces these; it never looks inside `data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawBlock {
    pub kind: BlockKind,
    pub data: Vec<u8>,
}

impl RawBlock {
    /// Build a block from an already-decoded header and the blob bytes that
    /// followed it.
    ///
    /// # Errors
    ///
    /// [`WireError::UnsupportedBlockType`] or any blob decode/inflate error.
    pub fn from_parts(header: &BlobHeader, blob: &[u8]) -> Result<Self, WireError> {
        let kind = BlockKind::from_type_str(&header.block_type)?;
        let data = Blob::decode(blob)?.into_payload()?;
        Ok(Self { kind, data })
    }
}

/// Parse the 4-byte big-endian prefix and enforce the header size limit.
///
/// # Errors
///
/// [`WireError::BlobHeaderTooLarge`] above [`MAX_BLOB_HEADER_SIZE`].
pub fn header_len_from_prefix(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize, WireError> {
    let size = u32::from_be_bytes(prefix) as usize;
    if size > MAX_BLOB_HEADER_SIZE {
        return Err(WireError::BlobHeaderTooLarge {
            size,
            limit: MAX_BLOB_HEADER_SIZE,
        });
    }
    Ok(size)
}

/// Read one frame from the front of an in-memory buffer.
///
/// Wire layout:
///
/// ```text
/// ┌────────────────────────────────────────────────┐
/// │ header_len  (u32, big-endian)                  │
/// │ BlobHeader  [header_len bytes]                 │
/// │ Blob        [BlobHeader.datasize bytes]        │
/// └────────────────────────────────────────────────┘
/// ```
///
/// # Returns
///
/// `Ok(None)` for an empty buffer (clean end of stream), otherwise the
/// block and the number of bytes consumed.
///
/// # Errors
///
/// [`WireError::UnexpectedEof`] for a truncated frame, plus every error of
/// [`BlobHeader::decode`] and [`RawBlock::from_parts`].
pub fn read_frame(buf: &[u8]) -> Result<Option<(RawBlock, usize)>, WireError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let prefix: [u8; LENGTH_PREFIX_SIZE] = buf
        .get(..LENGTH_PREFIX_SIZE)
        .and_then(|p| p.try_into().ok())
        .ok_or(WireError::UnexpectedEof { offset: buf.len() })?;
    let header_len = header_len_from_prefix(prefix)?;

    let mut cursor = LENGTH_PREFIX_SIZE;
    let header_bytes = buf
        .get(cursor..cursor + header_len)
        .ok_or(WireError::UnexpectedEof { offset: buf.len() })?;
    let header = BlobHeader::decode(header_bytes)?;
    cursor += header_len;

    // Reject foreign block types before touching the payload.
    BlockKind::from_type_str(&header.block_type)?;

    let blob = buf
        .get(cursor..cursor + header.data_size)
        .ok_or(WireError::UnexpectedEof { offset: buf.len() })?;
    cursor += header.data_size;

    Ok(Some((RawBlock::from_parts(&header, blob)?, cursor)))
}

/// Serialize one frame: length prefix, `BlobHeader` and `Blob`.
#[must_use]
pub fn write_frame(kind: BlockKind, blob: &Blob) -> Vec<u8> {
    let blob_bytes = blob.encode();
    let header = BlobHeader {
        block_type: kind.as_str().to_string(),
        index_data: None,
        data_size: blob_bytes.len(),
    }
    .encode();

    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + header.len() + blob_bytes.len());
    out.extend_from_slice(&(header.len() as u32).to_be_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&blob_bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame(kind: BlockKind, payload: &[u8]) -> Vec<u8> {
        write_frame(
            kind,
            &Blob {
                raw_size: Some(payload.len()),
                data: BlobData::Raw(payload.to_vec()),
            },
        )
    }

    #[test]
    fn reads_raw_frame() {
        let bytes = raw_frame(BlockKind::Data, b"primitive block");
        let (block, consumed) = read_frame(&bytes).unwrap().unwrap();
        assert_eq!(block.kind, BlockKind::Data);
        assert_eq!(block.data, b"primitive block");
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn reads_sequential_frames() {
        let mut bytes = raw_frame(BlockKind::Header, b"head");
        bytes.extend(raw_frame(BlockKind::Data, b"body"));

        let (first, n1) = read_frame(&bytes).unwrap().unwrap();
        let (second, n2) = read_frame(&bytes[n1..]).unwrap().unwrap();
        assert_eq!(first.kind, BlockKind::Header);
        assert_eq!(second.kind, BlockKind::Data);
        assert_eq!(n1 + n2, bytes.len());
        assert!(read_frame(&bytes[n1 + n2..]).unwrap().is_none());
    }

    #[test]
    fn zlib_and_zstd_payloads_inflate() {
        let payload = b"dense nodes ".repeat(200);
        for data in [
            BlobData::Zlib(compression::deflate_zlib(&payload).unwrap()),
            BlobData::Zstd(compression::compress_zstd(&payload).unwrap()),
        ] {
            let blob = Blob {
                raw_size: Some(payload.len()),
                data,
            };
            let bytes = write_frame(BlockKind::Data, &blob);
            let (block, _) = read_frame(&bytes).unwrap().unwrap();
            assert_eq!(block.data, payload);
        }
    }

    #[test]
    fn truncated_frame_is_eof() {
        let bytes = raw_frame(BlockKind::Data, b"0123456789");
        for cut in [2, 6, bytes.len() - 1] {
            assert!(
                matches!(read_frame(&bytes[..cut]), Err(WireError::UnexpectedEof { .. })),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn unknown_block_type_rejected() {
        let blob = Blob {
            raw_size: None,
            data: BlobData::Raw(vec![1]),
        }
        .encode();
        let header = BlobHeader {
            block_type: "OSMChangeset".into(),
            index_data: None,
            data_size: blob.len(),
        }
        .encode();
        let mut bytes = (header.len() as u32).to_be_bytes().to_vec();
        bytes.extend(header);
        bytes.extend(blob);

        assert!(matches!(
            read_frame(&bytes),
            Err(WireError::UnsupportedBlockType { found }) if found == "OSMChangeset"
        ));
    }

    #[test]
    fn oversized_header_prefix_rejected() {
        let prefix = (MAX_BLOB_HEADER_SIZE as u32 + 1).to_be_bytes();
        assert!(matches!(
            header_len_from_prefix(prefix),
            Err(WireError::BlobHeaderTooLarge { .. })
        ));
    }

    #[test]
    fn raw_size_mismatch_rejected() {
        let payload = b"abcabcabcabc".repeat(10);
        let blob = Blob {
            raw_size: Some(payload.len() + 1),
            data: BlobData::Zlib(compression::deflate_zlib(&payload).unwrap()),
        };
        assert!(matches!(
            blob.into_payload(),
            Err(WireError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn zstd_without_raw_size_inflates() {
        let payload = b"way refs ".repeat(300);
        let blob = Blob {
            raw_size: None,
            data: BlobData::Zstd(compression::compress_zstd(&payload).unwrap()),
        };
        assert_eq!(blob.into_payload().unwrap(), payload);
    }

    #[test]
    fn zstd_raw_size_mismatch_rejected() {
        let payload = b"relation members ".repeat(50);
        let blob = Blob {
            raw_size: Some(payload.len() - 1),
            data: BlobData::Zstd(compression::compress_zstd(&payload).unwrap()),
        };
        assert!(matches!(
            blob.into_payload(),
            Err(WireError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn unsupported_codecs_rejected() {
        let blob = Blob {
            raw_size: Some(4),
            data: BlobData::Lz4(vec![0; 4]),
        };
        assert!(matches!(
            blob.into_payload(),
            Err(WireError::UnsupportedCompression { codec: "lz4" })
        ));
    }

    #[test]
    fn blob_without_data_rejected() {
        let mut buf = Vec::new();
        encode_int_field(&mut buf, 2, 10);
        assert!(matches!(
            Blob::decode(&buf),
            Err(WireError::MissingField { message: "Blob", field: "data" })
        ));
    }
}
