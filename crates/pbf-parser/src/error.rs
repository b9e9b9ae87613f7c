use pbf_decoder::DecodeError;
use pbf_wire::{BlockKind, WireError};

/// Terminal outcome of a failed or cancelled parse.
///
/// ```text
///   ParseError
///   ├── Framing(WireError)     ← malformed or truncated frame, I/O failure
///   ├── UnsupportedBlockType   ← block type not valid at this position
///   ├── Decode(DecodeError)    ← malformed block contents
///   ├── Cancelled              ← stopped through a CancelToken
///   ├── DestinationClosed      ← a receiver was dropped mid-parse
///   ├── WorkerPanicked         ← decode task panicked
///   └── HookPanicked           ← a phase hook panicked
/// ```
///
/// Only the first error of a call is returned. `Cancelled` is not a
/// failure: the batches delivered before it are complete and valid.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("framing error: {0}")]
    Framing(#[source] WireError),

    /// The block has a type other than the one expected here: the first
    /// block must be `OSMHeader`, every later one `OSMData`.
    #[error("expected {expected} block, found {found:?}")]
    UnsupportedBlockType { expected: BlockKind, found: String },

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("parse cancelled")]
    Cancelled,

    #[error("{destination} destination closed by its receiver")]
    DestinationClosed { destination: &'static str },

    #[error("decode worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("{phase} phase hook panicked")]
    HookPanicked { phase: &'static str },
}

impl ParseError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Map a framer error, lifting an unknown block type into
    /// [`ParseError::UnsupportedBlockType`].
    pub(crate) fn framing(err: WireError, expected: BlockKind) -> Self {
        match err {
            WireError::UnsupportedBlockType { found } => Self::UnsupportedBlockType { expected, found },
            other => Self::Framing(other),
        }
    }
}

impl From<WireError> for ParseError {
    fn from(err: WireError) -> Self {
        Self::framing(err, BlockKind::Data)
    }
}
