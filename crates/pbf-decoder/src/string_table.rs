use pbf_wire::FieldReader;

use crate::error::DecodeError;

/// Block-scoped string table.
///
/// Built once from the `stringtable` message of a primitive block and
/// dropped with it. Tag keys, tag values, member roles and user names are
/// stored in entities as indices into this table.
///
/// Index 0 is reserved: it always resolves to `""` and is used as the
/// "absent" marker (and as the dense tag terminator).
#[derive(Clone, Debug, Default)]
pub struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    /// Build from raw entries.
    ///
    /// Bytes that are not UTF-8 are replaced with U+FFFD rather than
    /// rejected, so one bad user name cannot fail the block.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let strings = entries
            .into_iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect();
        Self { strings }
    }

    /// Decode a `StringTable` message (`repeated bytes s = 1`).
    ///
    /// # Errors
    ///
    /// Field-level errors from the wire layer.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut entries = Vec::new();
        let mut reader = FieldReader::new(buf);
        while let Some(field) = reader.next_field()? {
            if field.number == 1 {
                entries.push(field.as_bytes()?);
            }
        }
        Ok(Self::from_entries(entries))
    }

    /// Resolve an index to its string.
    ///
    /// # Errors
    ///
    /// [`DecodeError::StringIndexOutOfRange`] for a negative index or one
    /// past the end of the table. This means the block is malformed.
    pub fn resolve(&self, index: i64) -> Result<&str, DecodeError> {
        if index == 0 {
            return Ok("");
        }
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
            .ok_or(DecodeError::StringIndexOutOfRange {
                index,
                len: self.strings.len(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbf_wire::field::encode_bytes_field;

    fn table(entries: &[&str]) -> StringTable {
        StringTable::from_entries(entries.iter().map(|s| s.as_bytes()))
    }

    #[test]
    fn resolves_indices() {
        let t = table(&["", "highway", "primary"]);
        assert_eq!(t.resolve(1).unwrap(), "highway");
        assert_eq!(t.resolve(2).unwrap(), "primary");
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn index_zero_is_empty_even_if_table_is() {
        assert_eq!(StringTable::default().resolve(0).unwrap(), "");
        // entry 0 content is ignored
        assert_eq!(table(&["junk"]).resolve(0).unwrap(), "");
    }

    #[test]
    fn out_of_range_and_negative() {
        let t = table(&["", "a"]);
        assert!(matches!(
            t.resolve(2),
            Err(DecodeError::StringIndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            t.resolve(-1),
            Err(DecodeError::StringIndexOutOfRange { index: -1, .. })
        ));
    }

    #[test]
    fn invalid_utf8_entry_is_replaced_not_rejected() {
        let entries: [&[u8]; 4] = [b"", b"ok", &[0xFF, 0xFE], b"caf\xC3\xA9"];
        let t = StringTable::from_entries(entries);
        assert_eq!(t.len(), 4);
        assert_eq!(t.resolve(1).unwrap(), "ok");
        assert_eq!(t.resolve(2).unwrap(), "\u{FFFD}\u{FFFD}");
        assert_eq!(t.resolve(3).unwrap(), "caf\u{e9}");
    }

    #[test]
    fn decodes_message() {
        let mut buf = Vec::new();
        for s in ["", "name", "Monaco"] {
            encode_bytes_field(&mut buf, 1, s.as_bytes());
        }
        let t = StringTable::decode(&buf).unwrap();
        assert_eq!(t.resolve(2).unwrap(), "Monaco");
    }
}
