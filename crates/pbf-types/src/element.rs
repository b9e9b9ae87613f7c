use std::collections::HashMap;
use std::fmt;

use crate::error::TypeError;

/// Key/value attributes of an element. Keys are unique; order is not kept.
pub type Tags = HashMap<String, String>;

/// Optional authoring metadata attached to any element.
///
/// Only populated when the parser is configured with `include_metadata`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    pub version: i32,
    pub uid: i32,
    pub user: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub changeset: i64,
}

/// A point with coordinates in degrees (WGS84).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: Tags,
    pub metadata: Option<Metadata>,
}

/// An ordered list of node references forming a line or ring.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Way {
    pub id: i64,
    /// Node ids in geometry order.
    pub refs: Vec<i64>,
    pub tags: Tags,
    pub metadata: Option<Metadata>,
}

/// An ordered group of members, each referencing another element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Relation {
    pub id: i64,
    pub members: Vec<Member>,
    pub tags: Tags,
    pub metadata: Option<Metadata>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub id: i64,
    pub member_type: MemberType,
    pub role: String,
}

/// The kind of element a relation member points at.
///
/// ```text
/// ┌───────────┬──────┐
/// │ Variant   │ Wire │
/// ├───────────┼──────┤
/// │ Node      │ 0    │
/// │ Way       │ 1    │
/// │ Relation  │ 2    │
/// └───────────┴──────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

impl MemberType {
    /// # Errors
    ///
    /// [`TypeError::UnknownMemberType`] for codes other than 0, 1 and 2.
    pub fn from_wire(value: i32) -> Result<Self, TypeError> {
        match value {
            0 => Ok(Self::Node),
            1 => Ok(Self::Way),
            2 => Ok(Self::Relation),
            other => Err(TypeError::UnknownMemberType { value: other }),
        }
    }

    #[must_use]
    pub fn to_wire(self) -> i32 {
        match self {
            Self::Node => 0,
            Self::Way => 1,
            Self::Relation => 2,
        }
    }
}

/// The three element kinds, in the order a sorted file stores them.
///
/// Used for diagnostics and by consumers that record which kind of batch
/// they saw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        })
    }
}
