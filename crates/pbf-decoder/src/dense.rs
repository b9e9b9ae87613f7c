use pbf_types::{Metadata, Node, Tags};
use pbf_wire::FieldReader;
use pbf_wire::varint::zigzag_decode;

use crate::block::BlockContext;
use crate::error::DecodeError;
use crate::primitives::{as_int32, check_len, undelta};

/// Columns of a `DenseInfo` message.
///
/// `version` is stored as-is; every other column is delta-coded. A column
/// that is absent reads as zeros.
#[derive(Default)]
struct DenseInfo {
    version: Vec<i32>,
    timestamp: Vec<i64>,
    changeset: Vec<i64>,
    uid: Vec<i64>,
    user_sid: Vec<i64>,
}

impl DenseInfo {
    fn decode(buf: &[u8], count: usize) -> Result<Self, DecodeError> {
        let mut info = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => field.extend_packed(&mut info.version, as_int32)?,
                2 => field.extend_packed(&mut info.timestamp, zigzag_decode)?,
                3 => field.extend_packed(&mut info.changeset, zigzag_decode)?,
                4 => field.extend_packed(&mut info.uid, zigzag_decode)?,
                5 => field.extend_packed(&mut info.user_sid, zigzag_decode)?,
                _ => {}
            }
        }

        for (column, len) in [
            ("version", info.version.len()),
            ("timestamp", info.timestamp.len()),
            ("changeset", info.changeset.len()),
            ("uid", info.uid.len()),
            ("user_sid", info.user_sid.len()),
        ] {
            if len != 0 {
                check_len("DenseInfo", column, count, len)?;
            }
        }

        undelta(&mut info.timestamp);
        undelta(&mut info.changeset);
        undelta(&mut info.uid);
        undelta(&mut info.user_sid);
        Ok(info)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn metadata(&self, i: usize, ctx: &BlockContext) -> Result<Metadata, DecodeError> {
        Ok(Metadata {
            version: self.version.get(i).copied().unwrap_or(0),
            uid: at(&self.uid, i) as i32,
            user: ctx.strings.resolve(at(&self.user_sid, i))?.to_owned(),
            timestamp: ctx.timestamp(at(&self.timestamp, i)),
            changeset: at(&self.changeset, i),
        })
    }
}

fn at(column: &[i64], i: usize) -> i64 {
    column.get(i).copied().unwrap_or(0)
}

/// Decode a `DenseNodes` group.
///
/// ```text
///   id[i]  = id[i-1]  + Δid[i]        (seeded at 0)
///   lat[i] = 1e-9 * (lat_offset + granularity * Σ Δlat[0..=i])
///   lon[i] = 1e-9 * (lon_offset + granularity * Σ Δlon[0..=i])
///
///   keys_vals = k v k v 0 | 0 | k v 0 | ...
///               node 0      node 1  node 2
/// ```
///
/// An empty `keys_vals` column means no node carries tags. Otherwise every
/// node must find its `0` terminator; metadata is attached only when
/// `include_metadata` is set and a `denseinfo` message is present.
///
/// # Errors
///
/// - [`DecodeError::LengthMismatch`] when `lat`, `lon` or a non-empty
///   `denseinfo` column disagrees with `id`.
/// - [`DecodeError::UnterminatedTags`] / [`DecodeError::DanglingTagKey`]
///   for a truncated `keys_vals` stream.
/// - [`DecodeError::TrailingTags`] when entries follow the last node's
///   terminator.
/// - [`DecodeError::StringIndexOutOfRange`] for a bad key, value or user.
pub(crate) fn decode_dense(
    buf: &[u8],
    ctx: &BlockContext,
    include_metadata: bool,
) -> Result<Vec<Node>, DecodeError> {
    let mut ids = Vec::new();
    let mut lats = Vec::new();
    let mut lons = Vec::new();
    let mut keys_vals = Vec::new();
    let mut info = None;

    let mut reader = FieldReader::new(buf);
    while let Some(field) = reader.next_field()? {
        match field.number {
            1 => field.extend_packed(&mut ids, zigzag_decode)?,
            5 => info = Some(field.as_bytes()?),
            8 => field.extend_packed(&mut lats, zigzag_decode)?,
            9 => field.extend_packed(&mut lons, zigzag_decode)?,
            10 => field.extend_packed(&mut keys_vals, |v| i64::from(as_int32(v)))?,
            _ => {}
        }
    }

    check_len("DenseNodes", "lat", ids.len(), lats.len())?;
    check_len("DenseNodes", "lon", ids.len(), lons.len())?;
    undelta(&mut ids);
    undelta(&mut lats);
    undelta(&mut lons);

    let info = match info {
        Some(buf) if include_metadata => Some(DenseInfo::decode(buf, ids.len())?),
        _ => None,
    };
    let mut tags = DenseTags::new(&keys_vals);

    let mut nodes = Vec::with_capacity(ids.len());
    for (i, ((&id, &lat), &lon)) in ids.iter().zip(&lats).zip(&lons).enumerate() {
        nodes.push(Node {
            id,
            lat: ctx.lat(lat),
            lon: ctx.lon(lon),
            tags: tags.next_node(i, ctx)?,
            metadata: info.as_ref().map(|info| info.metadata(i, ctx)).transpose()?,
        });
    }
    tags.finish()?;
    Ok(nodes)
}

/// Cursor over the packed `keys_vals` stream.
struct DenseTags<'a> {
    stream: &'a [i64],
    pos: usize,
}

impl<'a> DenseTags<'a> {
    fn new(stream: &'a [i64]) -> Self {
        Self { stream, pos: 0 }
    }

    fn next_node(&mut self, node_index: usize, ctx: &BlockContext) -> Result<Tags, DecodeError> {
        let mut tags = Tags::new();
        if self.stream.is_empty() {
            return Ok(tags);
        }
        loop {
            let key = *self
                .stream
                .get(self.pos)
                .ok_or(DecodeError::UnterminatedTags { node_index })?;
            self.pos += 1;
            if key == 0 {
                return Ok(tags);
            }
            let value = *self
                .stream
                .get(self.pos)
                .ok_or(DecodeError::DanglingTagKey { node_index })?;
            self.pos += 1;
            tags.insert(
                ctx.strings.resolve(key)?.to_owned(),
                ctx.strings.resolve(value)?.to_owned(),
            );
        }
    }

    /// Every entry must belong to some node.
    fn finish(&self) -> Result<(), DecodeError> {
        match self.stream.len() - self.pos {
            0 => Ok(()),
            extra => Err(DecodeError::TrailingTags { extra }),
        }
    }
}
