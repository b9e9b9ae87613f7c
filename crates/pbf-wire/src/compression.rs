use std::io::{Cursor, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::WireError;

/// zstd level used when writing blobs. Level 3 is the zstd default and the
/// point where ratio stops improving much per unit of CPU.
const ZSTD_LEVEL: i32 = 3;

/// Inflate a zlib stream, refusing to produce more than `limit` bytes.
///
/// The decoder reads at most `limit + 1` bytes so a decompression bomb is
/// detected without inflating it completely.
///
/// # Errors
///
/// - [`WireError::DecompressFailed`] for a corrupt stream.
/// - [`WireError::BlobTooLarge`] if the output exceeds `limit`.
pub fn inflate_zlib(data: &[u8], limit: usize) -> Result<Vec<u8>, WireError> {
    bounded_read(ZlibDecoder::new(data), limit)
}

/// Inflate a zstd stream, refusing to produce more than `limit` bytes.
///
/// Streams like [`inflate_zlib`]; the output buffer grows with the data
/// instead of being sized to `limit` up front.
///
/// # Errors
///
/// - [`WireError::DecompressFailed`] for a corrupt frame.
/// - [`WireError::BlobTooLarge`] if the output exceeds `limit`.
pub fn inflate_zstd(data: &[u8], limit: usize) -> Result<Vec<u8>, WireError> {
    let decoder = zstd::stream::read::Decoder::new(data)
        .map_err(|e| WireError::DecompressFailed(e.to_string()))?;
    bounded_read(decoder, limit)
}

fn bounded_read(decoder: impl Read, limit: usize) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    decoder
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| WireError::DecompressFailed(e.to_string()))?;
    if out.len() > limit {
        return Err(WireError::BlobTooLarge {
            size: out.len(),
            limit,
        });
    }
    Ok(out)
}

/// Deflate `data` into a zlib stream at the default level.
///
/// # Errors
///
/// Only I/O errors from the in-memory writer, which do not occur in practice.
pub fn deflate_zlib(data: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Compress `data` into a single zstd frame.
///
/// # Errors
///
/// [`WireError::Io`] if zstd rejects the input.
pub fn compress_zstd(data: &[u8]) -> Result<Vec<u8>, WireError> {
    Ok(zstd::encode_all(Cursor::new(data), ZSTD_LEVEL)?)
}
