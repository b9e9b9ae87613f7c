#![warn(clippy::pedantic)]

pub mod element;
pub mod error;
pub mod header;

pub use element::{ElementKind, Member, MemberType, Metadata, Node, Relation, Tags, Way};
pub use error::TypeError;
pub use header::{BoundingBox, Header};
