use pbf_types::{Member, MemberType, Metadata, Node, Relation, Tags, TypeError, Way};
use pbf_wire::FieldReader;
use pbf_wire::varint::zigzag_decode;
use tracing::trace;

use crate::block::BlockContext;
use crate::error::DecodeError;

// ── Shared helpers ──────────────────────────────────────────────────────

/// Running sum over a delta-coded column, seeded at 0.
pub(crate) fn undelta(values: &mut [i64]) {
    let mut acc = 0i64;
    for v in values {
        acc = acc.wrapping_add(*v);
        *v = acc;
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn as_int32(raw: u64) -> i32 {
    raw as i32
}

#[allow(clippy::cast_possible_wrap)]
fn as_int64(raw: u64) -> i64 {
    raw as i64
}

pub(crate) fn check_len(
    message: &'static str,
    column: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), DecodeError> {
    if expected == found {
        Ok(())
    } else {
        Err(DecodeError::LengthMismatch {
            message,
            column,
            expected,
            found,
        })
    }
}

/// Zip the parallel `keys`/`vals` index lists of a plain entity.
fn zip_tags(
    message: &'static str,
    keys: &[i64],
    vals: &[i64],
    ctx: &BlockContext,
) -> Result<Tags, DecodeError> {
    check_len(message, "vals", keys.len(), vals.len())?;
    let mut tags = Tags::with_capacity(keys.len());
    for (&k, &v) in keys.iter().zip(vals) {
        tags.insert(
            ctx.strings.resolve(k)?.to_owned(),
            ctx.strings.resolve(v)?.to_owned(),
        );
    }
    Ok(tags)
}

/// Decode a per-entity `Info` message.
///
/// ```text
/// ┌──────────┬───────────┬───────────┬──────────────────────────┐
/// │ Field ID │ Wire Type │ Name      │ Description              │
/// ├──────────┼───────────┼───────────┼──────────────────────────┤
/// │ 1        │ Varint    │ version   │ int32                    │
/// │ 2        │ Varint    │ timestamp │ int64, date_granularity  │
/// │ 3        │ Varint    │ changeset │ int64                    │
/// │ 4        │ Varint    │ uid       │ int32                    │
/// │ 5        │ Varint    │ user_sid  │ uint32 string index      │
/// │ 6        │ Varint    │ visible   │ ignored                  │
/// └──────────┴───────────┴───────────┴──────────────────────────┘
/// ```
///
/// Unlike the dense columns, none of these are delta-coded.
fn decode_info(buf: &[u8], ctx: &BlockContext) -> Result<Metadata, DecodeError> {
    let mut meta = Metadata::default();
    let mut user_sid = 0i64;
    let mut reader = FieldReader::new(buf);
    while let Some(field) = reader.next_field()? {
        match field.number {
            1 => meta.version = field.as_i32()?,
            2 => meta.timestamp = ctx.timestamp(field.as_i64()?),
            3 => meta.changeset = field.as_i64()?,
            4 => meta.uid = field.as_i32()?,
            5 => user_sid = as_int64(field.as_u64()?),
            _ => {}
        }
    }
    meta.user = ctx.strings.resolve(user_sid)?.to_owned();
    Ok(meta)
}

// ── Entity decoders ─────────────────────────────────────────────────────

/// Decode a plain `Node`: absolute `sint64` id and coordinates.
pub(crate) fn decode_node(
    buf: &[u8],
    ctx: &BlockContext,
    include_metadata: bool,
) -> Result<Node, DecodeError> {
    let mut id = 0;
    let mut lat = 0;
    let mut lon = 0;
    let mut keys = Vec::new();
    let mut vals = Vec::new();
    let mut info = None;

    let mut reader = FieldReader::new(buf);
    while let Some(field) = reader.next_field()? {
        match field.number {
            1 => id = field.as_sint64()?,
            2 => field.extend_packed(&mut keys, as_int64)?,
            3 => field.extend_packed(&mut vals, as_int64)?,
            4 => info = Some(field.as_bytes()?),
            8 => lat = field.as_sint64()?,
            9 => lon = field.as_sint64()?,
            _ => {}
        }
    }

    Ok(Node {
        id,
        lat: ctx.lat(lat),
        lon: ctx.lon(lon),
        tags: zip_tags("Node", &keys, &vals, ctx)?,
        metadata: metadata(info, include_metadata, ctx)?,
    })
}

/// Decode a `Way`; `refs` (field 8) are delta-coded node ids.
pub(crate) fn decode_way(
    buf: &[u8],
    ctx: &BlockContext,
    include_metadata: bool,
) -> Result<Way, DecodeError> {
    let mut id = 0;
    let mut keys = Vec::new();
    let mut vals = Vec::new();
    let mut refs = Vec::new();
    let mut info = None;

    let mut reader = FieldReader::new(buf);
    while let Some(field) = reader.next_field()? {
        match field.number {
            1 => id = field.as_i64()?,
            2 => field.extend_packed(&mut keys, as_int64)?,
            3 => field.extend_packed(&mut vals, as_int64)?,
            4 => info = Some(field.as_bytes()?),
            8 => field.extend_packed(&mut refs, zigzag_decode)?,
            _ => {}
        }
    }
    undelta(&mut refs);

    Ok(Way {
        id,
        refs,
        tags: zip_tags("Way", &keys, &vals, ctx)?,
        metadata: metadata(info, include_metadata, ctx)?,
    })
}

/// Decode a `Relation`.
///
/// `roles_sid` (8), `memids` (9, delta-coded) and `types` (10) are zipped
/// into members. A member whose type code is unknown is dropped; the rest
/// of the relation is kept.
pub(crate) fn decode_relation(
    buf: &[u8],
    ctx: &BlockContext,
    include_metadata: bool,
) -> Result<Relation, DecodeError> {
    let mut id = 0;
    let mut keys = Vec::new();
    let mut vals = Vec::new();
    let mut roles = Vec::new();
    let mut memids = Vec::new();
    let mut types = Vec::new();
    let mut info = None;

    let mut reader = FieldReader::new(buf);
    while let Some(field) = reader.next_field()? {
        match field.number {
            1 => id = field.as_i64()?,
            2 => field.extend_packed(&mut keys, as_int64)?,
            3 => field.extend_packed(&mut vals, as_int64)?,
            4 => info = Some(field.as_bytes()?),
            8 => field.extend_packed(&mut roles, |v| i64::from(as_int32(v)))?,
            9 => field.extend_packed(&mut memids, zigzag_decode)?,
            10 => field.extend_packed(&mut types, as_int32)?,
            _ => {}
        }
    }
    check_len("Relation", "types", memids.len(), types.len())?;
    check_len("Relation", "roles_sid", memids.len(), roles.len())?;
    undelta(&mut memids);

    let mut members = Vec::with_capacity(memids.len());
    for ((&member_id, &code), &role) in memids.iter().zip(&types).zip(&roles) {
        let member_type = match MemberType::from_wire(code) {
            Ok(t) => t,
            Err(TypeError::UnknownMemberType { value }) => {
                trace!(relation = id, member = member_id, code = value, "dropping member of unknown type");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        members.push(Member {
            id: member_id,
            member_type,
            role: ctx.strings.resolve(role)?.to_owned(),
        });
    }

    Ok(Relation {
        id,
        members,
        tags: zip_tags("Relation", &keys, &vals, ctx)?,
        metadata: metadata(info, include_metadata, ctx)?,
    })
}

fn metadata(
    info: Option<&[u8]>,
    include_metadata: bool,
    ctx: &BlockContext,
) -> Result<Option<Metadata>, DecodeError> {
    match info {
        Some(buf) if include_metadata => decode_info(buf, ctx).map(Some),
        _ => Ok(None),
    }
}
