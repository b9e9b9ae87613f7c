#![warn(clippy::pedantic)]

pub mod block_writer;
pub mod encoder;
pub mod error;

pub use block_writer::{BlockOptions, BlockWriter, Group};
pub use encoder::{Compression, PbfEncoder};
pub use error::EncodeError;
