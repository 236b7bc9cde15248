//! Payload decoders and the driver that feeds them to a sink.
//!
//! # Architecture
//!
//! ```text
//!  StatisticRecord ──▶ Decoder ──┬── KSTAT_TYPE_NAMED ──▶ named::NamedFields
//!                                ├── KSTAT_TYPE_IO    ──▶ io::IoFields
//!                                ├── KSTAT_TYPE_INTR  ──▶ intr::intr_fields
//!                                ├── KSTAT_TYPE_RAW   ──▶ raw::RawRegistry
//!                                └── KSTAT_TYPE_TIMER ──▶ (metadata only)
//!                                         │
//!                                         ▼
//!                                     KstatSink
//! ```
//!
//! Decoding works on an owned snapshot and never touches the chain, so it
//! runs outside the session lock and can be parallelized freely.

pub mod intr;
pub mod io;
pub mod layout;
pub mod named;
pub mod raw;

use std::fmt;
use std::sync::Arc;

use tracing::warn;

pub use io::{IO_FIELD_NAMES, IoFields};
pub use intr::INTR_FIELD_NAMES;
pub use layout::{BlobWriter, CType, CompiledLayout, DataModel, Layout, Slot};
pub use named::{NamedBlob, NamedFields, named_fields};
pub use raw::RawRegistry;

use crate::model::{Field, KstatType, StatisticRecord};
use crate::sink::KstatSink;

/// Why a record produced no fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A raw kstat with no registered layout. Expected and recoverable.
    UnsupportedLayout { module: String, name: String },
    /// The blob is shorter than the layout it must hold.
    Truncated {
        what: &'static str,
        needed: usize,
        actual: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnsupportedLayout { module, name } => {
                write!(f, "no decoder for raw kstat {}:{}", module, name)
            }
            DecodeError::Truncated {
                what,
                needed,
                actual,
            } => write!(f, "{} needs {} bytes, blob has {}", what, needed, actual),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Dispatches a snapshot to the decoder for its type.
#[derive(Debug, Clone)]
pub struct Decoder {
    raw: Arc<RawRegistry>,
    io: CompiledLayout,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::native()
    }
}

impl Decoder {
    /// Decoder for blobs produced by the running kernel.
    pub fn native() -> Self {
        Self {
            raw: RawRegistry::native(),
            io: io::KSTAT_IO.compile(DataModel::NATIVE),
        }
    }

    /// Decoder for blobs captured from a kernel with another data model.
    pub fn new(model: DataModel) -> Self {
        if model == DataModel::NATIVE {
            return Self::native();
        }
        Self {
            raw: Arc::new(RawRegistry::new(model)),
            io: io::KSTAT_IO.compile(model),
        }
    }

    pub fn model(&self) -> DataModel {
        self.raw.model()
    }

    /// Decodes a record into a field list.
    ///
    /// IO records yield their twelve counters as fields; timer and unknown
    /// types yield nothing.
    pub fn decode(&self, record: &StatisticRecord) -> Result<Vec<Field>, DecodeError> {
        match record.header.kstat_type {
            KstatType::Named => Ok(named_fields(record).collect()),
            KstatType::Io => Ok(IoFields::decode(record, &self.io)?.fields().to_vec()),
            KstatType::Intr => intr::intr_fields(record),
            KstatType::Raw => self.raw.decode(record),
            KstatType::Timer | KstatType::Unknown(_) => Ok(Vec::new()),
        }
    }

    /// Streams a record into `sink`.
    ///
    /// `begin_record` is always called, even when decoding then fails, so
    /// the sink still learns class, type and times of the kstat.
    pub fn emit<S: KstatSink + ?Sized>(
        &self,
        record: &StatisticRecord,
        sink: &mut S,
    ) -> Result<(), DecodeError> {
        let header = &record.header;
        sink.begin_record(&header.class, header.kstat_type, header.crtime, record.snaptime);

        let result = match header.kstat_type {
            KstatType::Named => {
                for field in named_fields(record) {
                    sink.add_field(&field);
                }
                Ok(())
            }
            KstatType::Io => IoFields::decode(record, &self.io).map(|io| sink.add_io_fields(&io)),
            KstatType::Intr => intr::intr_fields(record).map(|fields| {
                for field in &fields {
                    sink.add_field(field);
                }
            }),
            KstatType::Raw => self.raw.decode(record).map(|fields| {
                for field in &fields {
                    sink.add_field(field);
                }
            }),
            KstatType::Timer | KstatType::Unknown(_) => Ok(()),
        };

        if let Err(e @ DecodeError::Truncated { .. }) = &result {
            warn!(kstat = %header.id, error = %e, "kstat payload truncated");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, KstatHeader, KstatId, Numeric};

    #[derive(Default)]
    struct Recorder {
        begun: Vec<(String, KstatType, i64, i64)>,
        calls: Vec<String>,
    }

    impl KstatSink for Recorder {
        fn begin_record(&mut self, class: &str, kstat_type: KstatType, crtime: i64, snaptime: i64) {
            self.begun.push((class.to_string(), kstat_type, crtime, snaptime));
        }

        fn add_numeric_field(&mut self, name: &str, field_type: FieldType, value: Numeric) {
            self.calls.push(format!("n {} {:?} {}", name, field_type, value));
        }

        fn add_text_field(&mut self, name: &str, field_type: FieldType, value: &str) {
            self.calls.push(format!("t {} {:?} {}", name, field_type, value));
        }

        fn add_io_fields(&mut self, io: &IoFields) {
            self.calls.push(format!("io {} {}", io.nread, io.rcnt));
        }
    }

    fn record(module: &str, name: &str, kstat_type: KstatType, ndata: u32, data: Vec<u8>) -> StatisticRecord {
        StatisticRecord {
            header: KstatHeader {
                id: KstatId::new(module, 0, name),
                class: "misc".into(),
                kstat_type,
                crtime: 10,
            },
            snaptime: 20,
            ndata,
            data,
            strings: Vec::new(),
        }
    }

    #[test]
    fn test_emit_named_streams_in_order() {
        let mut blob = NamedBlob::new();
        blob.uint32("ncpus", 8).char("model", "x86");
        let (data, ndata, strings) = blob.finish();
        let mut rec = record("unix", "system_misc", KstatType::Named, ndata, data);
        rec.strings = strings;

        let mut sink = Recorder::default();
        Decoder::native().emit(&rec, &mut sink).unwrap();
        assert_eq!(sink.begun, vec![("misc".to_string(), KstatType::Named, 10, 20)]);
        assert_eq!(sink.calls, vec!["n ncpus UInt32 8", "t model Char x86"]);
    }

    #[test]
    fn test_emit_io_uses_io_callback() {
        let decoder = Decoder::native();
        let layout = io::KSTAT_IO.compile(DataModel::NATIVE);
        let blob = BlobWriter::new(&layout).set_u64("nread", 512).set("rcnt", 2).finish();
        let rec = record("sd", "sd0", KstatType::Io, 1, blob);

        let mut sink = Recorder::default();
        decoder.emit(&rec, &mut sink).unwrap();
        assert_eq!(sink.calls, vec!["io 512 2"]);
        assert_eq!(decoder.decode(&rec).unwrap().len(), 12);
    }

    #[test]
    fn test_emit_unsupported_raw_still_begins_record() {
        let rec = record("zz", "bogus", KstatType::Raw, 1, vec![1, 2, 3]);
        let mut sink = Recorder::default();
        let err = Decoder::native().emit(&rec, &mut sink).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedLayout { .. }));
        assert_eq!(sink.begun.len(), 1);
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn test_timer_has_metadata_only() {
        let rec = record("kstat", "timer", KstatType::Timer, 0, Vec::new());
        let mut sink = Recorder::default();
        Decoder::native().emit(&rec, &mut sink).unwrap();
        assert_eq!(sink.begun.len(), 1);
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn test_foreign_model_decoder() {
        let other = match DataModel::NATIVE {
            DataModel::Lp64 => DataModel::Ilp32,
            DataModel::Ilp32 => DataModel::Lp64,
        };
        let decoder = Decoder::new(other);
        assert_eq!(decoder.model(), other);
        assert_eq!(Decoder::new(DataModel::NATIVE).model(), DataModel::NATIVE);
    }

    #[test]
    fn test_decode_error_display() {
        let e = DecodeError::UnsupportedLayout {
            module: "zz".into(),
            name: "bogus".into(),
        };
        assert_eq!(e.to_string(), "no decoder for raw kstat zz:bogus");
    }
}
