//! Consumer-side interfaces.
//!
//! The core never builds the caller's objects itself. Decoded data is pushed
//! into a [`KstatSink`] in decode order, and chain enumeration pushes one
//! [`KstatHeader`] per entry into an [`IdentitySink`].

use crate::decode::IoFields;
use crate::model::{Field, FieldType, FieldValue, KstatHeader, KstatType, Numeric};

/// Receives one decoded kstat.
///
/// `begin_record` is always called first, exactly once per record; field
/// calls follow in the order the decoder produced them.
pub trait KstatSink {
    fn begin_record(&mut self, class: &str, kstat_type: KstatType, crtime: i64, snaptime: i64);

    fn add_numeric_field(&mut self, name: &str, field_type: FieldType, value: Numeric);

    fn add_text_field(&mut self, name: &str, field_type: FieldType, value: &str);

    /// The twelve `kstat_io_t` counters of an IO kstat.
    fn add_io_fields(&mut self, io: &IoFields);

    /// Routes a decoded field to the numeric or text callback.
    fn add_field(&mut self, field: &Field) {
        match &field.value {
            FieldValue::Number(n) => self.add_numeric_field(&field.name, field.field_type, *n),
            FieldValue::Text(s) => self.add_text_field(&field.name, field.field_type, s),
        }
    }
}

/// Receives chain identities during enumeration.
pub trait IdentitySink {
    fn add_identity(&mut self, header: KstatHeader);
}

impl IdentitySink for Vec<KstatHeader> {
    fn add_identity(&mut self, header: KstatHeader) {
        self.push(header);
    }
}
