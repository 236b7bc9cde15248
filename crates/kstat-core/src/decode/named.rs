//! Decoder for `KSTAT_TYPE_NAMED` records.
//!
//! The payload is an array of `kstat_named_t`:
//!
//! ```text
//!  0                31  32                         48
//!  ┌──────────────────┬──┬──────────────────────────┐
//!  │ name[31]         │ty│ value union (16 bytes)   │
//!  └──────────────────┴──┴──────────────────────────┘
//! ```
//!
//! The union holds an `int32`/`uint32`/`int64`/`uint64`, a 16-byte `char`
//! array, or a `{ char *ptr (padded to 8); uint32_t len }` string
//! descriptor, so the entry is 48 bytes under both data models. String
//! pointers are resolved by the chain at read time and arrive in
//! [`StatisticRecord::strings`].

use tracing::debug;

use crate::decode::layout::{c_text, read_scalar};
use crate::model::{Field, FieldType, MISSING_TEXT, StatisticRecord, UNSUPPORTED_TEXT};

/// `KSTAT_STRLEN`: size of kstat name arrays.
pub const KSTAT_STRLEN: usize = 31;
/// Offset of `data_type` within `kstat_named_t`.
pub const NAMED_TYPE_OFFSET: usize = KSTAT_STRLEN;
/// Offset of the value union within `kstat_named_t`.
pub const NAMED_VALUE_OFFSET: usize = 32;
/// Size of the value union; also the capacity of `KSTAT_DATA_CHAR` text.
pub const NAMED_VALUE_SIZE: usize = 16;
/// `sizeof (kstat_named_t)`.
pub const NAMED_ENTRY_SIZE: usize = NAMED_VALUE_OFFSET + NAMED_VALUE_SIZE;

/// Lazily decodes the entries of a named record.
///
/// Yields `min(ks_ndata, blob / 48)` fields, so a short blob ends the
/// sequence early instead of reading past it. Re-invoke [`named_fields`]
/// to restart.
#[derive(Clone, Debug)]
pub struct NamedFields<'a> {
    record: &'a StatisticRecord,
    index: usize,
    count: usize,
}

/// Starts decoding `record` as a named kstat.
pub fn named_fields(record: &StatisticRecord) -> NamedFields<'_> {
    let reported = record.ndata as usize;
    let actual = record.data.len() / NAMED_ENTRY_SIZE;
    if reported > actual {
        debug!(
            kstat = %record.id(),
            reported,
            actual,
            "named kstat blob shorter than ks_ndata"
        );
    }
    NamedFields {
        record,
        index: 0,
        count: reported.min(actual),
    }
}

impl Iterator for NamedFields<'_> {
    type Item = Field;

    fn next(&mut self) -> Option<Field> {
        if self.index >= self.count {
            return None;
        }
        let i = self.index;
        self.index += 1;

        let start = i * NAMED_ENTRY_SIZE;
        let entry = &self.record.data[start..start + NAMED_ENTRY_SIZE];
        let name = c_text(&entry[..KSTAT_STRLEN]);
        let value = &entry[NAMED_VALUE_OFFSET..NAMED_ENTRY_SIZE];

        let field = match FieldType::from_tag(entry[NAMED_TYPE_OFFSET]) {
            FieldType::Int32 => Field::numeric(name, FieldType::Int32, read_scalar(&value[..4], true)),
            FieldType::UInt32 => {
                Field::numeric(name, FieldType::UInt32, read_scalar(&value[..4], false))
            }
            FieldType::Int64 => Field::numeric(name, FieldType::Int64, read_scalar(&value[..8], true)),
            FieldType::UInt64 => {
                Field::numeric(name, FieldType::UInt64, read_scalar(&value[..8], false))
            }
            FieldType::Char => Field::text(name, FieldType::Char, c_text(value)),
            FieldType::String => {
                let text = self
                    .record
                    .string_at(i)
                    .map(c_text)
                    .unwrap_or_else(|| MISSING_TEXT.to_string());
                Field::text(name, FieldType::String, text)
            }
            FieldType::Unsupported(tag) => {
                debug!(kstat = %self.record.id(), statistic = %name, tag, "unsupported named data type");
                Field::text(name, FieldType::Unsupported(tag), UNSUPPORTED_TEXT)
            }
        };
        Some(field)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.count - self.index;
        (left, Some(left))
    }
}

impl ExactSizeIterator for NamedFields<'_> {}

/// Builds `kstat_named_t` arrays for the mock chain and tests.
#[derive(Clone, Debug, Default)]
pub struct NamedBlob {
    data: Vec<u8>,
    strings: Vec<Option<Vec<u8>>>,
}

impl NamedBlob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Appends an entry with an arbitrary type tag and value bytes.
    pub fn entry(&mut self, name: &str, tag: u8, value: &[u8]) -> &mut Self {
        let mut entry = [0u8; NAMED_ENTRY_SIZE];
        let n = name.len().min(KSTAT_STRLEN - 1);
        entry[..n].copy_from_slice(&name.as_bytes()[..n]);
        entry[NAMED_TYPE_OFFSET] = tag;
        let v = value.len().min(NAMED_VALUE_SIZE);
        entry[NAMED_VALUE_OFFSET..NAMED_VALUE_OFFSET + v].copy_from_slice(&value[..v]);
        self.data.extend_from_slice(&entry);
        self.strings.push(None);
        self
    }

    pub fn int32(&mut self, name: &str, value: i32) -> &mut Self {
        self.entry(name, FieldType::DATA_INT32, &value.to_ne_bytes())
    }

    pub fn uint32(&mut self, name: &str, value: u32) -> &mut Self {
        self.entry(name, FieldType::DATA_UINT32, &value.to_ne_bytes())
    }

    pub fn int64(&mut self, name: &str, value: i64) -> &mut Self {
        self.entry(name, FieldType::DATA_INT64, &value.to_ne_bytes())
    }

    pub fn uint64(&mut self, name: &str, value: u64) -> &mut Self {
        self.entry(name, FieldType::DATA_UINT64, &value.to_ne_bytes())
    }

    /// A `KSTAT_DATA_CHAR` entry; text beyond 16 bytes is cut off.
    pub fn char(&mut self, name: &str, value: &str) -> &mut Self {
        self.entry(name, FieldType::DATA_CHAR, value.as_bytes())
    }

    /// A `KSTAT_DATA_STRING` entry; `None` models a null pointer.
    pub fn string(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        self.entry(name, FieldType::DATA_STRING, &[]);
        if let Some(last) = self.strings.last_mut() {
            *last = value.map(|s| {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                bytes
            });
        }
        self
    }

    /// Returns `(ks_data, ks_ndata, detached strings)`.
    pub fn finish(&self) -> (Vec<u8>, u32, Vec<Option<Vec<u8>>>) {
        (self.data.clone(), self.strings.len() as u32, self.strings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldValue, KstatHeader, KstatId, KstatType, Numeric};

    fn record(blob: &NamedBlob) -> StatisticRecord {
        let (data, ndata, strings) = blob.finish();
        StatisticRecord {
            header: KstatHeader {
                id: KstatId::new("unix", 0, "system_misc"),
                class: "misc".into(),
                kstat_type: KstatType::Named,
                crtime: 100,
            },
            snaptime: 200,
            ndata,
            data,
            strings,
        }
    }

    #[test]
    fn test_all_types_decode() {
        let mut blob = NamedBlob::new();
        blob.int32("i32", -7)
            .uint32("u32", 4_000_000_000)
            .int64("i64", -1 << 40)
            .uint64("u64", u64::MAX)
            .char("chr", "GenuineIntel")
            .string("str", Some("global"));
        let rec = record(&blob);
        let fields: Vec<Field> = named_fields(&rec).collect();

        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0], Field::i32("i32", -7));
        assert_eq!(fields[1], Field::u32("u32", 4_000_000_000));
        assert_eq!(fields[2], Field::i64("i64", -1 << 40));
        assert_eq!(fields[3], Field::u64("u64", u64::MAX));
        assert_eq!(fields[4], Field::text("chr", FieldType::Char, "GenuineIntel"));
        assert_eq!(fields[5], Field::text("str", FieldType::String, "global"));
    }

    #[test]
    fn test_char_uses_all_sixteen_bytes() {
        let mut blob = NamedBlob::new();
        blob.char("brand", "0123456789abcdefXYZ");
        let rec = record(&blob);
        let f = named_fields(&rec).next().unwrap();
        assert_eq!(f.value, FieldValue::Text("0123456789abcdef".into()));
    }

    #[test]
    fn test_null_string_gets_placeholder() {
        let mut blob = NamedBlob::new();
        blob.string("zonename", None).uint32("after", 1);
        let rec = record(&blob);
        let fields: Vec<Field> = named_fields(&rec).collect();
        assert_eq!(fields[0], Field::text("zonename", FieldType::String, MISSING_TEXT));
        assert_eq!(fields[1], Field::u32("after", 1));
    }

    #[test]
    fn test_unknown_tag_is_isolated() {
        let mut blob = NamedBlob::new();
        blob.uint32("before", 10)
            .entry("float_stat", 5, &[1, 2, 3, 4])
            .int64("after", 20);
        let rec = record(&blob);
        let fields: Vec<Field> = named_fields(&rec).collect();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], Field::u32("before", 10));
        assert_eq!(
            fields[1],
            Field::text("float_stat", FieldType::Unsupported(5), UNSUPPORTED_TEXT)
        );
        assert_eq!(fields[2], Field::i64("after", 20));
    }

    #[test]
    fn test_ndata_larger_than_blob_is_clamped() {
        let mut blob = NamedBlob::new();
        blob.uint32("a", 1).uint32("b", 2);
        let mut rec = record(&blob);
        rec.ndata = 10;
        assert_eq!(named_fields(&rec).len(), 2);

        rec.data.truncate(NAMED_ENTRY_SIZE + 5);
        assert_eq!(named_fields(&rec).count(), 1);
    }

    #[test]
    fn test_decoding_is_restartable() {
        let mut blob = NamedBlob::new();
        blob.uint64("x", 1).string("y", Some("z"));
        let rec = record(&blob);
        let first: Vec<Field> = named_fields(&rec).collect();
        let second: Vec<Field> = named_fields(&rec).collect();
        assert_eq!(first, second);
        assert_eq!(first[0].value.as_numeric(), Some(Numeric::Unsigned(1)));
    }

    #[test]
    fn test_long_names_truncated_to_kstat_strlen() {
        let mut blob = NamedBlob::new();
        let long = "a_statistic_name_that_is_far_too_long";
        blob.uint32(long, 3);
        let rec = record(&blob);
        let f = named_fields(&rec).next().unwrap();
        assert_eq!(f.name, &long[..KSTAT_STRLEN - 1]);
    }
}
