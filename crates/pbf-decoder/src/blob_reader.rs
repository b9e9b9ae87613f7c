use std::io::ErrorKind;

use pbf_wire::blob::{Blob, BlobHeader, LENGTH_PREFIX_SIZE, header_len_from_prefix};
use pbf_wire::{BlockKind, RawBlock, WireError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// One frame as read from the stream, payload still compressed.
///
/// Inflating is left to the caller so it can happen off the reading task.
#[derive(Clone, Debug)]
pub struct Frame {
  pub kind: BlockKind,
  pub blob: Blob,
  /// Byte offset of the frame's length prefix in the stream.
  pub offset: u64,
}

impl Frame {
  /// Inflate the payload.
  ///
  /// # Errors
  ///
  /// Any error of [`Blob::into_payload`].
  pub fn into_block(self) -> Result<RawBlock, WireError> {
    Ok(RawBlock {
      kind: self.kind,
      data: self.blob.into_payload()?,
    })
  }
}

/// Sequential reader of framed blocks from an async byte stream.
///
/// ```text
///   ┌──────────────┬──────────────┬──────────────┬─────
///   │ len (u32 BE) │ BlobHeader   │ Blob         │ ...
///   └──────────────┴──────────────┴──────────────┴─────
///   ^ frame 0                                    ^ frame 1
/// ```
///
/// Only one reader touches the stream. Reading is pull-based: nothing is
/// read until [`next_frame`](Self::next_frame) or
/// [`next_block`](Self::next_block) is awaited.
///
/// # Example
///
/// ```rust,no_run
/// use pbf_decoder::BlobReader;
///
/// async fn count(file: tokio::fs::File) -> usize {
///     let mut reader = BlobReader::new(file);
///     let mut n = 0;
///     while let Some(_block) = reader.next_block().await.unwrap() {
///         n += 1;
///     }
///     n
/// }
/// ```
pub struct BlobReader<R> {
  reader: R,
  offset: u64,
  frames: u64,
  buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> BlobReader<R> {
  #[must_use]
  pub fn new(reader: R) -> Self {
    Self {
      reader,
      offset: 0,
      frames: 0,
      buf: Vec::with_capacity(4096),
    }
  }

  /// Bytes consumed from the stream so far.
  #[must_use]
  pub fn offset(&self) -> u64 {
    self.offset
  }

  /// Frames read so far.
  #[must_use]
  pub fn frames_read(&self) -> u64 {
    self.frames
  }

  #[must_use]
  pub fn into_inner(self) -> R {
    self.reader
  }

  /// Read the next frame without inflating it.
  ///
  /// Returns `Ok(None)` at a clean end of stream, i.e. when the stream ends
  /// exactly on a frame boundary.
  ///
  /// # Errors
  ///
  /// - [`WireError::UnexpectedEof`] when the stream ends inside a frame.
  /// - [`WireError::BlobHeaderTooLarge`] / [`WireError::BlobTooLarge`] for
  ///   sizes above the format limits.
  /// - [`WireError::UnsupportedBlockType`] for a type other than
  ///   `OSMHeader` or `OSMData`.
  /// - [`WireError::Io`] for other read failures.
  pub async fn next_frame(&mut self) -> Result<Option<Frame>, WireError> {
    let start = self.offset;

    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
      let n = self.reader.read(&mut prefix[filled..]).await?;
      if n == 0 {
        if filled == 0 {
          return Ok(None);
        }
        return Err(WireError::UnexpectedEof {
          offset: self.position(filled),
        });
      }
      filled += n;
    }
    self.offset += LENGTH_PREFIX_SIZE as u64;

    let header_len = header_len_from_prefix(prefix)?;
    self.fill(header_len).await?;
    let header = BlobHeader::decode(&self.buf)?;
    let kind = BlockKind::from_type_str(&header.block_type)?;

    self.fill(header.data_size).await?;
    let blob = Blob::decode(&self.buf)?;

    self.frames += 1;
    trace!(offset = start, %kind, size = header.data_size, "frame read");
    Ok(Some(Frame {
      kind,
      blob,
      offset: start,
    }))
  }

  /// Read the next frame and inflate its payload.
  ///
  /// # Errors
  ///
  /// Every error of [`next_frame`](Self::next_frame) and of
  /// [`Frame::into_block`].
  pub async fn next_block(&mut self) -> Result<Option<RawBlock>, WireError> {
    match self.next_frame().await? {
      Some(frame) => frame.into_block().map(Some),
      None => Ok(None),
    }
  }

  /// Read exactly `len` bytes into the scratch buffer.
  async fn fill(&mut self, len: usize) -> Result<(), WireError> {
    self.buf.clear();
    self.buf.resize(len, 0);
    match self.reader.read_exact(&mut self.buf).await {
      Ok(_) => {
        self.offset += len as u64;
        Ok(())
      }
      Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(WireError::UnexpectedEof {
        offset: self.position(0),
      }),
      Err(e) => Err(WireError::Io(e)),
    }
  }

  #[allow(clippy::cast_possible_truncation)]
  fn position(&self, extra: usize) -> usize {
    self.offset as usize + extra
  }
}
