//! Decoded statistic values.
//!
//! Every decoder in this crate emits [`Field`]s: a statistic name, the
//! kernel data type it was reported with, and the value widened to 64 bits
//! (or copied out as text).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder emitted for a named STRING field whose pointer is null.
pub const MISSING_TEXT: &str = "null";

/// Placeholder emitted for a named field with a type tag we do not decode.
pub const UNSUPPORTED_TEXT: &str = "junk";

/// Kernel data type of a statistic.
///
/// The discriminants follow the `KSTAT_DATA_*` codes of `<sys/kstat.h>`.
/// `Unsupported` carries a tag that is outside the set the decoders
/// understand; such fields always hold [`UNSUPPORTED_TEXT`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Fixed-width text, at most 16 bytes (`KSTAT_DATA_CHAR`).
    Char,
    Int32,
    UInt32,
    Int64,
    UInt64,
    /// Variable-length text (`KSTAT_DATA_STRING`).
    String,
    Unsupported(u8),
}

impl FieldType {
    pub const DATA_CHAR: u8 = 0;
    pub const DATA_INT32: u8 = 1;
    pub const DATA_UINT32: u8 = 2;
    pub const DATA_INT64: u8 = 3;
    pub const DATA_UINT64: u8 = 4;
    pub const DATA_STRING: u8 = 9;

    /// Maps a raw `data_type` tag to a field type. Never fails.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            Self::DATA_CHAR => FieldType::Char,
            Self::DATA_INT32 => FieldType::Int32,
            Self::DATA_UINT32 => FieldType::UInt32,
            Self::DATA_INT64 => FieldType::Int64,
            Self::DATA_UINT64 => FieldType::UInt64,
            Self::DATA_STRING => FieldType::String,
            other => FieldType::Unsupported(other),
        }
    }

    /// The kernel type code.
    pub fn tag(self) -> u8 {
        match self {
            FieldType::Char => Self::DATA_CHAR,
            FieldType::Int32 => Self::DATA_INT32,
            FieldType::UInt32 => Self::DATA_UINT32,
            FieldType::Int64 => Self::DATA_INT64,
            FieldType::UInt64 => Self::DATA_UINT64,
            FieldType::String => Self::DATA_STRING,
            FieldType::Unsupported(tag) => tag,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Int32 | FieldType::UInt32 | FieldType::Int64 | FieldType::UInt64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(self, FieldType::Int32 | FieldType::Int64)
    }
}

/// A numeric value widened to 64 bits, keeping its signedness.
///
/// Deserializing tries `Unsigned` first, so only negative numbers come
/// back as `Signed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Unsigned(u64),
    Signed(i64),
}

impl Numeric {
    /// Value as `i64`, the way a JNI `jlong` would carry it.
    ///
    /// Unsigned values above `i64::MAX` wrap, same as the kernel's own
    /// `(int64_t)` casts.
    pub fn as_i64(self) -> i64 {
        match self {
            Numeric::Signed(v) => v,
            Numeric::Unsigned(v) => v as i64,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Numeric::Signed(v) => v as u64,
            Numeric::Unsigned(v) => v,
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Signed(v) => write!(f, "{}", v),
            Numeric::Unsigned(v) => write!(f, "{}", v),
        }
    }
}

/// Value of one decoded field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(Numeric),
    Text(String),
}

impl FieldValue {
    pub fn as_numeric(&self) -> Option<Numeric> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Number(_) => None,
            FieldValue::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => n.fmt(f),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// A (name, type, value) triple produced by a decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub value: FieldValue,
}

impl Field {
    pub fn numeric(name: impl Into<String>, field_type: FieldType, value: Numeric) -> Self {
        Self {
            name: name.into(),
            field_type,
            value: FieldValue::Number(value),
        }
    }

    pub fn text(name: impl Into<String>, field_type: FieldType, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type,
            value: FieldValue::Text(value.into()),
        }
    }

    pub fn i32(name: impl Into<String>, value: i32) -> Self {
        Self::numeric(name, FieldType::Int32, Numeric::Signed(value as i64))
    }

    pub fn u32(name: impl Into<String>, value: u32) -> Self {
        Self::numeric(name, FieldType::UInt32, Numeric::Unsigned(value as u64))
    }

    pub fn i64(name: impl Into<String>, value: i64) -> Self {
        Self::numeric(name, FieldType::Int64, Numeric::Signed(value))
    }

    pub fn u64(name: impl Into<String>, value: u64) -> Self {
        Self::numeric(name, FieldType::UInt64, Numeric::Unsigned(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_tags_round_trip_known_codes() {
        for tag in [0u8, 1, 2, 3, 4, 9] {
            assert_eq!(FieldType::from_tag(tag).tag(), tag);
        }
        assert_eq!(FieldType::from_tag(5), FieldType::Unsupported(5));
        assert_eq!(FieldType::from_tag(200).tag(), 200);
    }

    #[test]
    fn test_field_type_numeric() {
        assert!(FieldType::Int32.is_numeric());
        assert!(FieldType::UInt64.is_numeric());
        assert!(!FieldType::Char.is_numeric());
        assert!(!FieldType::String.is_numeric());
        assert!(!FieldType::Unsupported(7).is_numeric());
    }

    #[test]
    fn test_numeric_display_keeps_sign() {
        assert_eq!(Numeric::Signed(-5).to_string(), "-5");
        assert_eq!(Numeric::Unsigned(u64::MAX).to_string(), "18446744073709551615");
        assert_eq!(Numeric::Unsigned(u64::MAX).as_i64(), -1);
    }

    #[test]
    fn test_field_constructors() {
        let f = Field::u32("runque", 7);
        assert_eq!(f.field_type, FieldType::UInt32);
        assert_eq!(f.value.as_numeric(), Some(Numeric::Unsigned(7)));
        assert_eq!(f.value.as_text(), None);

        let t = Field::text("mik_proto", FieldType::Char, "tcp");
        assert_eq!(t.value.as_text(), Some("tcp"));
        assert_eq!(t.value.to_string(), "tcp");
    }
}
