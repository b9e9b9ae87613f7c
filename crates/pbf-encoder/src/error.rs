use pbf_wire::WireError;

/// Errors that can occur while writing a PBF stream.
///
/// ```text
///   EncodeError
///   ├── BlockTooLarge   ← serialized block exceeds the blob size limit
///   └── Wire(WireError) ← compression failures from pbf-wire
/// ```
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("block payload exceeds maximum size ({size} bytes, limit {limit})")]
    BlockTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Wire(#[from] WireError),
}
