#![warn(clippy::pedantic)]

pub mod blob_reader;
pub mod block;
pub mod error;
pub mod string_table;

mod dense;
mod primitives;

pub use blob_reader::{BlobReader, Frame};
pub use block::{Batch, BlockContext, DecodeOptions, NodeRouting, decode_primitive_block};
pub use error::DecodeError;
pub use string_table::StringTable;
