#![warn(clippy::pedantic)]

pub mod blob;
pub mod compression;
pub mod error;
pub mod field;
pub mod varint;

pub use blob::{BlockKind, RawBlock};
pub use error::WireError;
pub use field::{FieldReader, RawField, WireType};
