use pbf_wire::WireError;

/// Errors raised while interpreting message bodies as typed values.
///
/// ```text
/// ┌─────────────────────────────────────────────────────┐
/// │ TypeError (this crate)                              │
/// │   ├── wraps WireError for field-level failures      │
/// │   └── UnknownMemberType for out-of-range codes      │
/// └─────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// A relation member carried a type code outside `NODE=0`, `WAY=1`,
    /// `RELATION=2`. Relation decoding drops such a member rather than
    /// failing the relation.
    #[error("unknown relation member type code {value}")]
    UnknownMemberType { value: i32 },

    /// A field inside the body could not be read.
    #[error(transparent)]
    Wire(#[from] WireError),
}
