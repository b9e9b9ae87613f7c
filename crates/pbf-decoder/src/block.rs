use pbf_types::{ElementKind, Node, Relation, Way};
use pbf_wire::{FieldReader, RawField};
use tracing::trace;

use crate::dense::decode_dense;
use crate::error::DecodeError;
use crate::primitives::{decode_node, decode_relation, decode_way};
use crate::string_table::StringTable;

/// Where decoded nodes go, derived from which node destinations exist.
///
/// ```text
/// ┌─────────────┬────────┬───────┬──────────────────────────────────────┐
/// │ Routing     │ coords │ nodes │ Behaviour                            │
/// ├─────────────┼────────┼───────┼──────────────────────────────────────┤
/// │ Split       │ yes    │ yes   │ untagged → coords, tagged → nodes    │
/// │ All         │ no     │ yes   │ every node → nodes                   │
/// │ CoordsOnly  │ yes    │ no    │ every node → coords                  │
/// │ Skip        │ no     │ no    │ node groups are not decoded          │
/// └─────────────┴────────┴───────┴──────────────────────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeRouting {
    Split,
    All,
    CoordsOnly,
    #[default]
    Skip,
}

impl NodeRouting {
    #[must_use]
    pub fn from_destinations(coords: bool, nodes: bool) -> Self {
        match (coords, nodes) {
            (true, true) => Self::Split,
            (false, true) => Self::All,
            (true, false) => Self::CoordsOnly,
            (false, false) => Self::Skip,
        }
    }

    #[must_use]
    pub fn decodes_nodes(self) -> bool {
        self != Self::Skip
    }

    fn goes_to_coords(self, node: &Node) -> bool {
        match self {
            Self::Split => node.tags.is_empty(),
            Self::CoordsOnly => true,
            Self::All | Self::Skip => false,
        }
    }
}

/// Which entity kinds to decode and whether to attach metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub include_metadata: bool,
    pub nodes: NodeRouting,
    pub ways: bool,
    pub relations: bool,
}

impl DecodeOptions {
    /// `false` when no kind is wanted; blocks then need no decoding at all.
    #[must_use]
    pub fn wants_any(&self) -> bool {
        self.nodes.decodes_nodes() || self.ways || self.relations
    }

    fn wants_group_field(&self, number: u32) -> bool {
        match number {
            1 | 2 => self.nodes.decodes_nodes(),
            3 => self.ways,
            4 => self.relations,
            _ => false,
        }
    }
}

/// A non-empty run of same-kind entities from one primitive group.
#[derive(Clone, Debug, PartialEq)]
pub enum Batch {
    /// Nodes for the coordinate-only destination.
    Coords(Vec<Node>),
    /// Nodes for the tagged-node destination.
    Nodes(Vec<Node>),
    Ways(Vec<Way>),
    Relations(Vec<Relation>),
}

impl Batch {
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Coords(_) | Self::Nodes(_) => ElementKind::Node,
            Self::Ways(_) => ElementKind::Way,
            Self::Relations(_) => ElementKind::Relation,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Coords(v) | Self::Nodes(v) => v.len(),
            Self::Ways(v) => v.len(),
            Self::Relations(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-block decoding state: the string table plus the coordinate and
/// timestamp scaling declared by the block.
///
/// ```text
///   degrees = 1e-9 * (offset + granularity * raw)
///   seconds = raw * date_granularity / 1000
/// ```
#[derive(Debug)]
pub struct BlockContext {
    pub strings: StringTable,
    pub granularity: i64,
    pub lat_offset: i64,
    pub lon_offset: i64,
    pub date_granularity: i64,
}

impl BlockContext {
    #[must_use]
    pub fn new(strings: StringTable) -> Self {
        Self {
            strings,
            granularity: 100,
            lat_offset: 0,
            lon_offset: 0,
            date_granularity: 1000,
        }
    }

    #[must_use]
    pub fn lat(&self, raw: i64) -> f64 {
        scale(self.lat_offset, self.granularity, raw)
    }

    #[must_use]
    pub fn lon(&self, raw: i64) -> f64 {
        scale(self.lon_offset, self.granularity, raw)
    }

    #[must_use]
    pub fn timestamp(&self, raw: i64) -> i64 {
        raw.wrapping_mul(self.date_granularity) / 1000
    }
}

#[allow(clippy::cast_precision_loss)]
fn scale(offset: i64, granularity: i64, raw: i64) -> f64 {
    1e-9 * offset.wrapping_add(granularity.wrapping_mul(raw)) as f64
}

/// Decode one inflated `PrimitiveBlock` into batches.
///
/// ```text
/// PrimitiveBlock
/// ├── 1  stringtable
/// ├── 2  primitivegroup (repeated)
/// │      ├── 1 nodes      (repeated Node)
/// │      ├── 2 dense      (DenseNodes)
/// │      ├── 3 ways       (repeated Way)
/// │      ├── 4 relations  (repeated Relation)
/// │      └── 5 changesets (ignored)
/// ├── 17 granularity
/// ├── 18 date_granularity
/// ├── 19 lat_offset
/// └── 20 lon_offset
/// ```
///
/// Groups holding only unwanted kinds are never decoded. When no group
/// holds a wanted kind the string table is not built either. Batches come
/// out in group order, empty ones omitted; for one group, a `Coords`
/// batch precedes its `Nodes` batch.
///
/// # Errors
///
/// Any [`DecodeError`]. The block is decoded completely before returning,
/// so an error means no batch of the block is exposed.
pub fn decode_primitive_block(
    buf: &[u8],
    opts: &DecodeOptions,
) -> Result<Vec<Batch>, DecodeError> {
    let mut table = None;
    let mut group_bufs = Vec::new();
    let mut granularity = None;
    let mut date_granularity = None;
    let mut lat_offset = None;
    let mut lon_offset = None;

    let mut reader = FieldReader::new(buf);
    while let Some(field) = reader.next_field()? {
        match field.number {
            1 => table = Some(field.as_bytes()?),
            2 => group_bufs.push(field.as_bytes()?),
            17 => granularity = Some(i64::from(field.as_i32()?)),
            18 => date_granularity = Some(i64::from(field.as_i32()?)),
            19 => lat_offset = Some(field.as_i64()?),
            20 => lon_offset = Some(field.as_i64()?),
            _ => {}
        }
    }

    let mut groups = Vec::with_capacity(group_bufs.len());
    for group in group_bufs {
        let mut members = Vec::new();
        let mut reader = FieldReader::new(group);
        while let Some(field) = reader.next_field()? {
            if opts.wants_group_field(field.number) {
                members.push(field);
            }
        }
        groups.push(members);
    }

    if groups.iter().all(Vec::is_empty) {
        trace!(groups = groups.len(), "block holds no wanted kinds");
        return Ok(Vec::new());
    }

    let strings = table.map_or_else(|| Ok(StringTable::default()), StringTable::decode)?;
    let mut ctx = BlockContext::new(strings);
    if let Some(g) = granularity {
        ctx.granularity = g;
    }
    if let Some(g) = date_granularity {
        ctx.date_granularity = g;
    }
    if let Some(o) = lat_offset {
        ctx.lat_offset = o;
    }
    if let Some(o) = lon_offset {
        ctx.lon_offset = o;
    }

    let mut batches = Vec::new();
    for members in &groups {
        decode_group(members, &ctx, opts, &mut batches)?;
    }
    trace!(batches = batches.len(), strings = ctx.strings.len(), "block decoded");
    Ok(batches)
}

fn decode_group(
    members: &[RawField<'_>],
    ctx: &BlockContext,
    opts: &DecodeOptions,
    out: &mut Vec<Batch>,
) -> Result<(), DecodeError> {
    let mut nodes = Vec::new();
    let mut ways = Vec::new();
    let mut relations = Vec::new();

    for field in members {
        match field.number {
            1 => nodes.push(decode_node(field.as_bytes()?, ctx, opts.include_metadata)?),
            2 => nodes.extend(decode_dense(field.as_bytes()?, ctx, opts.include_metadata)?),
            3 => ways.push(decode_way(field.as_bytes()?, ctx, opts.include_metadata)?),
            4 => relations.push(decode_relation(field.as_bytes()?, ctx, opts.include_metadata)?),
            _ => {}
        }
    }

    if !nodes.is_empty() {
        let (coords, tagged): (Vec<_>, Vec<_>) =
            nodes.into_iter().partition(|n| opts.nodes.goes_to_coords(n));
        if !coords.is_empty() {
            out.push(Batch::Coords(coords));
        }
        if !tagged.is_empty() {
            out.push(Batch::Nodes(tagged));
        }
    }
    if !ways.is_empty() {
        out.push(Batch::Ways(ways));
    }
    if !relations.is_empty() {
        out.push(Batch::Relations(relations));
    }
    Ok(())
}
