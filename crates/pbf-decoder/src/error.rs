use pbf_types::TypeError;
use pbf_wire::WireError;

/// Errors raised while decoding the contents of a primitive block.
///
/// Every variant is fatal for the block that produced it: a block with
/// one malformed structure is never partially emitted.
///
/// ```text
///   DecodeError
///   ├── StringIndexOutOfRange ← index past the end of the block's table
///   ├── LengthMismatch        ← parallel columns disagree in length
///   ├── UnterminatedTags      ← keys_vals ran out before a node's 0
///   ├── DanglingTagKey        ← keys_vals ended between key and value
///   ├── TrailingTags          ← keys_vals continues past the last node
///   ├── Type(TypeError)       ← from pbf-types
///   └── Wire(WireError)       ← field-level failures from pbf-wire
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("string index {index} out of range for table of {len} entries")]
    StringIndexOutOfRange { index: i64, len: usize },

    /// Two columns that must be zipped have different lengths.
    #[error("{message}.{column} has {found} entries, expected {expected}")]
    LengthMismatch {
        message: &'static str,
        column: &'static str,
        expected: usize,
        found: usize,
    },

    /// The dense `keys_vals` stream ended before node `node_index` saw its
    /// `0` terminator.
    #[error("dense tag stream ended before the terminator of node {node_index}")]
    UnterminatedTags { node_index: usize },

    /// The dense `keys_vals` stream ended right after a key.
    #[error("dense tag stream has a key without a value at node {node_index}")]
    DanglingTagKey { node_index: usize },

    /// The dense `keys_vals` stream has `extra` entries after the last
    /// node's terminator.
    #[error("dense tag stream has {extra} entries after the last node")]
    TrailingTags { extra: usize },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Wire(#[from] WireError),
}
