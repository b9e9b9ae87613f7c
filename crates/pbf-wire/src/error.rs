/// Errors raised while framing blobs or walking protobuf fields.
///
/// Every variant here is a *framing* failure: the bytes could not be cut
/// into well-formed messages. Nothing in this crate looks at the meaning of
/// a message, so content problems (bad string indices, column length
/// mismatches) live in the decoder's error type instead.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Varint encoding exceeded 10 bytes without terminating.
    #[error("varint too long: exceeded 10-byte limit")]
    VarintTooLong,

    /// Input ended before a complete varint, field or frame could be read.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    /// A field key carried a wire type this reader does not handle
    /// (the deprecated group types 3 and 4, or anything above 5).
    #[error("unsupported protobuf wire type {value}")]
    UnsupportedWireType { value: u64 },

    /// A field was read with an accessor that does not match its wire type,
    /// e.g. a length-delimited field read as a varint.
    #[error("field {field} has wire type {found:?}, expected {expected:?}")]
    WireTypeMismatch {
        field: u32,
        expected: crate::field::WireType,
        found: crate::field::WireType,
    },

    /// A message was missing a field the format requires.
    #[error("{message} is missing required field `{field}`")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },

    /// The length prefix announced a blob header larger than the format allows.
    #[error("blob header of {size} bytes exceeds limit of {limit} bytes")]
    BlobHeaderTooLarge { size: usize, limit: usize },

    /// The blob (compressed or inflated) is larger than the format allows.
    #[error("blob of {size} bytes exceeds limit of {limit} bytes")]
    BlobTooLarge { size: usize, limit: usize },

    /// The blob header declared a type that is neither `OSMHeader` nor `OSMData`.
    #[error("unsupported block type {found:?}")]
    UnsupportedBlockType { found: String },

    /// The blob payload uses a compression scheme this build cannot inflate.
    #[error("unsupported blob compression: {codec}")]
    UnsupportedCompression { codec: &'static str },

    /// zlib or zstd could not inflate the payload.
    #[error("blob decompression failed: {0}")]
    DecompressFailed(String),

    /// The inflated payload length differs from the declared `raw_size`.
    #[error("inflated blob is {actual} bytes but raw_size declared {declared}")]
    SizeMismatch { declared: usize, actual: usize },

    /// I/O error from the underlying reader.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
