use std::collections::HashMap;

use pbf_types::{Metadata, Node, Relation, Tags, Way};
use pbf_wire::field::{
    encode_bytes_field, encode_int_field, encode_packed_field, encode_sint_field,
    encode_varint_field,
};
use pbf_wire::varint::zigzag_encode;

/// Coordinate and timestamp scaling for one primitive block.
///
/// ```text
///   degrees   = 1e-9 * (offset + granularity * value)
///   seconds   = value * date_granularity / 1000
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockOptions {
    /// Nanodegrees per coordinate unit.
    pub granularity: i32,
    pub lat_offset: i64,
    pub lon_offset: i64,
    /// Milliseconds per timestamp unit.
    pub date_granularity: i32,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            granularity: 100,
            lat_offset: 0,
            lon_offset: 0,
            date_granularity: 1000,
        }
    }
}

impl BlockOptions {
    #[allow(clippy::cast_possible_truncation)]
    fn coordinate(self, degrees: f64, offset: i64) -> i64 {
        let nano = (degrees * 1e9).round() as i64;
        (nano - offset) / i64::from(self.granularity)
    }

    fn timestamp(self, seconds: i64) -> i64 {
        seconds * 1000 / i64::from(self.date_granularity)
    }
}

/// One primitive group: every entity in a group has the same kind and
/// encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Group {
    DenseNodes(Vec<Node>),
    Nodes(Vec<Node>),
    Ways(Vec<Way>),
    Relations(Vec<Relation>),
}

/// Serializer for one `PrimitiveBlock`.
///
/// Strings are interned into a block-scoped table as groups are written;
/// index 0 is reserved for the empty string. Tags are written sorted by
/// key so the output is deterministic.
///
/// ```text
/// ┌──────────┬───────────┬──────────────────┬──────────────────────────┐
/// │ Field ID │ Wire Type │ Name             │ Description              │
/// ├──────────┼───────────┼──────────────────┼──────────────────────────┤
/// │ 1        │ LEN       │ stringtable      │ StringTable { s = 1 }    │
/// │ 2        │ LEN       │ primitivegroup   │ repeated                 │
/// │ 17       │ Varint    │ granularity      │ default 100              │
/// │ 18       │ Varint    │ date_granularity │ default 1000             │
/// │ 19       │ Varint    │ lat_offset       │ default 0                │
/// │ 20       │ Varint    │ lon_offset       │ default 0                │
/// └──────────┴───────────┴──────────────────┴──────────────────────────┘
/// ```
pub struct BlockWriter {
    options: BlockOptions,
    strings: Vec<String>,
    index: HashMap<String, u32>,
    groups: Vec<Vec<u8>>,
}

impl BlockWriter {
    #[must_use]
    pub fn new(options: BlockOptions) -> Self {
        Self {
            options,
            strings: vec![String::new()],
            index: HashMap::from([(String::new(), 0)]),
            groups: Vec::new(),
        }
    }

    /// Intern `s` and return its table index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }

    pub fn write_group(&mut self, group: &Group) {
        let field = match group {
            Group::DenseNodes(nodes) => {
                let dense = self.dense_nodes(nodes);
                let mut buf = Vec::new();
                encode_bytes_field(&mut buf, 2, &dense);
                buf
            }
            Group::Nodes(nodes) => {
                let mut buf = Vec::new();
                for node in nodes {
                    let msg = self.node(node);
                    encode_bytes_field(&mut buf, 1, &msg);
                }
                buf
            }
            Group::Ways(ways) => {
                let mut buf = Vec::new();
                for way in ways {
                    let msg = self.way(way);
                    encode_bytes_field(&mut buf, 3, &msg);
                }
                buf
            }
            Group::Relations(relations) => {
                let mut buf = Vec::new();
                for relation in relations {
                    let msg = self.relation(relation);
                    encode_bytes_field(&mut buf, 4, &msg);
                }
                buf
            }
        };
        self.groups.push(field);
    }

    /// Assemble the `PrimitiveBlock` body.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        let mut table = Vec::new();
        for s in &self.strings {
            encode_bytes_field(&mut table, 1, s.as_bytes());
        }

        let mut buf = Vec::new();
        encode_bytes_field(&mut buf, 1, &table);
        for group in &self.groups {
            encode_bytes_field(&mut buf, 2, group);
        }

        let defaults = BlockOptions::default();
        if self.options.granularity != defaults.granularity {
            encode_int_field(&mut buf, 17, i64::from(self.options.granularity));
        }
        if self.options.date_granularity != defaults.date_granularity {
            encode_int_field(&mut buf, 18, i64::from(self.options.date_granularity));
        }
        if self.options.lat_offset != 0 {
            encode_int_field(&mut buf, 19, self.options.lat_offset);
        }
        if self.options.lon_offset != 0 {
            encode_int_field(&mut buf, 20, self.options.lon_offset);
        }
        buf
    }

    // ── Entity messages ─────────────────────────────────────────────────

    fn sorted_tags(&mut self, tags: &Tags) -> Vec<(u32, u32)> {
        let mut pairs: Vec<_> = tags.iter().collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(k, v)| (self.intern(k), self.intern(v)))
            .collect()
    }

    fn write_tags(&mut self, buf: &mut Vec<u8>, tags: &Tags) {
        let pairs = self.sorted_tags(tags);
        encode_packed_field(buf, 2, pairs.iter().map(|&(k, _)| u64::from(k)));
        encode_packed_field(buf, 3, pairs.iter().map(|&(_, v)| u64::from(v)));
    }

    fn info(&mut self, meta: &Metadata) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_int_field(&mut buf, 1, i64::from(meta.version));
        encode_int_field(&mut buf, 2, self.options.timestamp(meta.timestamp));
        encode_int_field(&mut buf, 3, meta.changeset);
        encode_int_field(&mut buf, 4, i64::from(meta.uid));
        let user = self.intern(&meta.user);
        encode_varint_field(&mut buf, 5, u64::from(user));
        buf
    }

    fn node(&mut self, node: &Node) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_sint_field(&mut buf, 1, node.id);
        self.write_tags(&mut buf, &node.tags);
        if let Some(meta) = &node.metadata {
            let info = self.info(meta);
            encode_bytes_field(&mut buf, 4, &info);
        }
        let opts = self.options;
        encode_sint_field(&mut buf, 8, opts.coordinate(node.lat, opts.lat_offset));
        encode_sint_field(&mut buf, 9, opts.coordinate(node.lon, opts.lon_offset));
        buf
    }

    fn way(&mut self, way: &Way) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_int_field(&mut buf, 1, way.id);
        self.write_tags(&mut buf, &way.tags);
        if let Some(meta) = &way.metadata {
            let info = self.info(meta);
            encode_bytes_field(&mut buf, 4, &info);
        }
        encode_packed_field(&mut buf, 8, deltas(way.refs.iter().copied()));
        buf
    }

    fn relation(&mut self, relation: &Relation) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_int_field(&mut buf, 1, relation.id);
        self.write_tags(&mut buf, &relation.tags);
        if let Some(meta) = &relation.metadata {
            let info = self.info(meta);
            encode_bytes_field(&mut buf, 4, &info);
        }
        let roles: Vec<u64> = relation
            .members
            .iter()
            .map(|m| u64::from(self.intern(&m.role)))
            .collect();
        encode_packed_field(&mut buf, 8, roles);
        encode_packed_field(&mut buf, 9, deltas(relation.members.iter().map(|m| m.id)));
        encode_packed_field(
            &mut buf,
            10,
            relation.members.iter().map(|m| m.member_type.to_wire() as u64),
        );
        buf
    }

    /// Columnar `DenseNodes` message.
    ///
    /// ```text
    /// ┌──────────┬────────────┬─────────────────────────────────────┐
    /// │ Field ID │ Name       │ Encoding                            │
    /// ├──────────┼────────────┼─────────────────────────────────────┤
    /// │ 1        │ id         │ packed sint64, delta                │
    /// │ 5        │ denseinfo  │ DenseInfo message                   │
    /// │ 8        │ lat        │ packed sint64, delta                │
    /// │ 9        │ lon        │ packed sint64, delta                │
    /// │ 10       │ keys_vals  │ packed int32, k v ... 0 per node    │
    /// └──────────┴────────────┴─────────────────────────────────────┘
    /// ```
    ///
    /// `keys_vals` is omitted entirely when no node has tags. `denseinfo`
    /// is written when any node has metadata; nodes without metadata get
    /// zeroed columns.
    fn dense_nodes(&mut self, nodes: &[Node]) -> Vec<u8> {
        let opts = self.options;
        let mut buf = Vec::new();
        encode_packed_field(&mut buf, 1, deltas(nodes.iter().map(|n| n.id)));

        if nodes.iter().any(|n| n.metadata.is_some()) {
            let default = Metadata::default();
            let metas: Vec<&Metadata> = nodes
                .iter()
                .map(|n| n.metadata.as_ref().unwrap_or(&default))
                .collect();
            let users: Vec<i64> = metas
                .iter()
                .map(|m| i64::from(self.intern(&m.user)))
                .collect();

            let mut info = Vec::new();
            encode_packed_field(&mut info, 1, metas.iter().map(|m| i64::from(m.version) as u64));
            encode_packed_field(
                &mut info,
                2,
                deltas(metas.iter().map(|m| opts.timestamp(m.timestamp))),
            );
            encode_packed_field(&mut info, 3, deltas(metas.iter().map(|m| m.changeset)));
            encode_packed_field(&mut info, 4, deltas(metas.iter().map(|m| i64::from(m.uid))));
            encode_packed_field(&mut info, 5, deltas(users));
            encode_bytes_field(&mut buf, 5, &info);
        }

        encode_packed_field(
            &mut buf,
            8,
            deltas(nodes.iter().map(|n| opts.coordinate(n.lat, opts.lat_offset))),
        );
        encode_packed_field(
            &mut buf,
            9,
            deltas(nodes.iter().map(|n| opts.coordinate(n.lon, opts.lon_offset))),
        );

        if nodes.iter().any(|n| !n.tags.is_empty()) {
            let mut keys_vals = Vec::new();
            for node in nodes {
                for (k, v) in self.sorted_tags(&node.tags) {
                    keys_vals.push(u64::from(k));
                    keys_vals.push(u64::from(v));
                }
                keys_vals.push(0);
            }
            encode_packed_field(&mut buf, 10, keys_vals);
        }
        buf
    }
}

/// Delta-code a column and zigzag each difference for `sint64` packing.
fn deltas(values: impl IntoIterator<Item = i64>) -> Vec<u64> {
    let mut prev = 0i64;
    values
        .into_iter()
        .map(|v| {
            let delta = v.wrapping_sub(prev);
            prev = v;
            zigzag_encode(delta)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbf_wire::field::FieldReader;
    use pbf_wire::varint::zigzag_decode;

    #[test]
    fn string_table_reserves_index_zero() {
        let mut writer = BlockWriter::new(BlockOptions::default());
        assert_eq!(writer.intern(""), 0);
        assert_eq!(writer.intern("highway"), 1);
        assert_eq!(writer.intern("primary"), 2);
        assert_eq!(writer.intern("highway"), 1);
    }

    #[test]
    fn deltas_are_zigzagged_differences() {
        let encoded = deltas([10, 12, 9]);
        let decoded: Vec<i64> = encoded.into_iter().map(zigzag_decode).collect();
        assert_eq!(decoded, vec![10, 2, -3]);
    }

    #[test]
    fn coordinates_apply_granularity_and_offset() {
        let opts = BlockOptions {
            granularity: 1000,
            lat_offset: 500,
            ..BlockOptions::default()
        };
        // 43.7370125 degrees = 43_737_012_500 nanodegrees
        assert_eq!(opts.coordinate(43.737_012_5, opts.lat_offset), 43_737_012);
        assert_eq!(BlockOptions::default().coordinate(43.737_012_5, 0), 437_370_125);
    }

    #[test]
    fn default_options_are_not_written() {
        let body = BlockWriter::new(BlockOptions::default()).finish();
        let mut reader = FieldReader::new(&body);
        let first = reader.next_field().unwrap().unwrap();
        assert_eq!(first.number, 1);
        assert!(reader.next_field().unwrap().is_none());
    }
}
