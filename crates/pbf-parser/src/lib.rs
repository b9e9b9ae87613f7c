#![warn(clippy::pedantic)]

pub mod barrier;
pub mod cancel;
pub mod config;
pub mod error;
pub mod parser;

pub use barrier::{BarrierState, PhaseBarrier, PhaseHook};
pub use cancel::CancelToken;
pub use config::ParserConfig;
pub use error::ParseError;
pub use parser::{ParseState, Parser};
