use pbf_wire::field::{
    FieldReader, encode_bytes_field, encode_int_field, encode_sint_field,
};

use crate::error::TypeError;

/// Nanodegrees per degree, the unit of every bounding-box coordinate.
const NANO: f64 = 1e9;

/// The file's bounding extent in degrees.
///
/// ```text
/// ┌──────────┬───────────┬────────┬──────────────────────────┐
/// │ Field ID │ Wire Type │ Name   │ Description              │
/// ├──────────┼───────────┼────────┼──────────────────────────┤
/// │ 1        │ Varint    │ left   │ sint64 nanodegrees       │
/// │ 2        │ Varint    │ right  │ sint64 nanodegrees       │
/// │ 3        │ Varint    │ top    │ sint64 nanodegrees       │
/// │ 4        │ Varint    │ bottom │ sint64 nanodegrees       │
/// └──────────┴───────────┴────────┴──────────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl BoundingBox {
    fn decode(buf: &[u8]) -> Result<Self, TypeError> {
        let mut bbox = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => bbox.left = nano_to_degrees(field.as_sint64()?),
                2 => bbox.right = nano_to_degrees(field.as_sint64()?),
                3 => bbox.top = nano_to_degrees(field.as_sint64()?),
                4 => bbox.bottom = nano_to_degrees(field.as_sint64()?),
                _ => {}
            }
        }
        Ok(bbox)
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_sint_field(&mut buf, 1, degrees_to_nano(self.left));
        encode_sint_field(&mut buf, 2, degrees_to_nano(self.right));
        encode_sint_field(&mut buf, 3, degrees_to_nano(self.top));
        encode_sint_field(&mut buf, 4, degrees_to_nano(self.bottom));
        buf
    }
}

#[allow(clippy::cast_precision_loss)]
fn nano_to_degrees(value: i64) -> f64 {
    value as f64 / NANO
}

#[allow(clippy::cast_possible_truncation)]
fn degrees_to_nano(value: f64) -> i64 {
    (value * NANO).round() as i64
}

/// Contents of the leading `OSMHeader` block.
///
/// ```text
/// ┌──────────┬───────────┬──────────────────────┬──────────────────────────┐
/// │ Field ID │ Wire Type │ Name                 │ Description              │
/// ├──────────┼───────────┼──────────────────────┼──────────────────────────┤
/// │ 1        │ LEN       │ bbox                 │ HeaderBBox message       │
/// │ 4        │ LEN       │ required_features    │ repeated string          │
/// │ 5        │ LEN       │ optional_features    │ repeated string          │
/// │ 16       │ LEN       │ writingprogram       │ string                   │
/// │ 17       │ LEN       │ source               │ string                   │
/// │ 32       │ Varint    │ replication_timestamp│ int64, seconds           │
/// │ 33       │ Varint    │ replication_sequence │ int64                    │
/// │ 34       │ LEN       │ replication_base_url │ string                   │
/// └──────────┴───────────┴──────────────────────┴──────────────────────────┘
/// ```
///
/// A zero replication timestamp is treated the same as an absent one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    pub bbox: Option<BoundingBox>,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    pub writing_program: Option<String>,
    pub source: Option<String>,
    /// Seconds since the Unix epoch.
    pub replication_timestamp: Option<i64>,
    pub replication_sequence: Option<i64>,
    pub replication_base_url: Option<String>,
}

impl Header {
    /// Decode the inflated payload of an `OSMHeader` block.
    ///
    /// Unknown fields are skipped. Strings that are not valid UTF-8 are
    /// replaced lossily; header strings are informational only.
    ///
    /// # Errors
    ///
    /// [`TypeError::Wire`] if any field is malformed or has the wrong wire
    /// type.
    pub fn decode_body(buf: &[u8]) -> Result<Self, TypeError> {
        let mut header = Self::default();
        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            match field.number {
                1 => header.bbox = Some(BoundingBox::decode(field.as_bytes()?)?),
                4 => header.required_features.push(lossy(field.as_bytes()?)),
                5 => header.optional_features.push(lossy(field.as_bytes()?)),
                16 => header.writing_program = Some(lossy(field.as_bytes()?)),
                17 => header.source = Some(lossy(field.as_bytes()?)),
                32 => header.replication_timestamp = Some(field.as_i64()?).filter(|&t| t != 0),
                33 => header.replication_sequence = Some(field.as_i64()?),
                34 => header.replication_base_url = Some(lossy(field.as_bytes()?)),
                _ => {}
            }
        }
        Ok(header)
    }

    /// Serialize into an `OSMHeader` payload.
    #[must_use]
    pub fn encode_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(bbox) = &self.bbox {
            encode_bytes_field(&mut buf, 1, &bbox.encode());
        }
        for feature in &self.required_features {
            encode_bytes_field(&mut buf, 4, feature.as_bytes());
        }
        for feature in &self.optional_features {
            encode_bytes_field(&mut buf, 5, feature.as_bytes());
        }
        if let Some(program) = &self.writing_program {
            encode_bytes_field(&mut buf, 16, program.as_bytes());
        }
        if let Some(source) = &self.source {
            encode_bytes_field(&mut buf, 17, source.as_bytes());
        }
        if let Some(timestamp) = self.replication_timestamp {
            encode_int_field(&mut buf, 32, timestamp);
        }
        if let Some(sequence) = self.replication_sequence {
            encode_int_field(&mut buf, 33, sequence);
        }
        if let Some(url) = &self.replication_base_url {
            encode_bytes_field(&mut buf, 34, url.as_bytes());
        }
        buf
    }

    /// Whether `feature` is listed under `required_features`.
    #[must_use]
    pub fn requires(&self, feature: &str) -> bool {
        self.required_features.iter().any(|f| f == feature)
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
