//! Decoder for `KSTAT_TYPE_IO` records (`kstat_io_t`).

use crate::decode::DecodeError;
use crate::decode::layout::{CType, CompiledLayout, Layout, Slot};
use crate::model::{Field, StatisticRecord};

/// Statistic names of an IO kstat, in emission order.
pub const IO_FIELD_NAMES: [&str; 12] = [
    "nread",
    "nwritten",
    "reads",
    "writes",
    "wtime",
    "wlentime",
    "wlastupdate",
    "rtime",
    "rlentime",
    "rlastupdate",
    "wcnt",
    "rcnt",
];

/// `kstat_io_t` from `<sys/kstat.h>`.
pub static KSTAT_IO: Layout = Layout {
    name: "kstat_io_t",
    slots: &[
        Slot::Field("nread", CType::ULongLong),
        Slot::Field("nwritten", CType::ULongLong),
        Slot::Field("reads", CType::UInt),
        Slot::Field("writes", CType::UInt),
        Slot::Field("wtime", CType::LongLong),
        Slot::Field("wlentime", CType::LongLong),
        Slot::Field("wlastupdate", CType::LongLong),
        Slot::Field("rtime", CType::LongLong),
        Slot::Field("rlentime", CType::LongLong),
        Slot::Field("rlastupdate", CType::LongLong),
        Slot::Field("wcnt", CType::UInt),
        Slot::Field("rcnt", CType::UInt),
    ],
};

/// The twelve counters of an IO kstat, all widened to 64 bits.
///
/// Byte, operation and queue counts are unsigned; the `hrtime_t`
/// accumulators are signed nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoFields {
    /// Bytes read.
    pub nread: u64,
    /// Bytes written.
    pub nwritten: u64,
    /// Read operations.
    pub reads: u64,
    /// Write operations.
    pub writes: u64,
    /// Cumulative wait (pre-service) time.
    pub wtime: i64,
    /// Cumulative wait length*time product.
    pub wlentime: i64,
    /// Last time wait queue changed.
    pub wlastupdate: i64,
    /// Cumulative run (service) time.
    pub rtime: i64,
    /// Cumulative run length*time product.
    pub rlentime: i64,
    /// Last time run queue changed.
    pub rlastupdate: i64,
    /// Count of elements in wait state.
    pub wcnt: u64,
    /// Count of elements in run state.
    pub rcnt: u64,
}

impl IoFields {
    /// Decodes the `kstat_io_t` at the start of the record payload.
    pub fn decode(record: &StatisticRecord, layout: &CompiledLayout) -> Result<Self, DecodeError> {
        let fields = layout.decode(&record.data)?;
        let u = |i: usize| fields[i].value.as_numeric().map(|n| n.as_u64()).unwrap_or(0);
        let s = |i: usize| fields[i].value.as_numeric().map(|n| n.as_i64()).unwrap_or(0);
        Ok(IoFields {
            nread: u(0),
            nwritten: u(1),
            reads: u(2),
            writes: u(3),
            wtime: s(4),
            wlentime: s(5),
            wlastupdate: s(6),
            rtime: s(7),
            rlentime: s(8),
            rlastupdate: s(9),
            wcnt: u(10),
            rcnt: u(11),
        })
    }

    /// The counters as fields, in the order of [`IO_FIELD_NAMES`].
    pub fn fields(&self) -> [Field; 12] {
        [
            Field::u64("nread", self.nread),
            Field::u64("nwritten", self.nwritten),
            Field::u64("reads", self.reads),
            Field::u64("writes", self.writes),
            Field::i64("wtime", self.wtime),
            Field::i64("wlentime", self.wlentime),
            Field::i64("wlastupdate", self.wlastupdate),
            Field::i64("rtime", self.rtime),
            Field::i64("rlentime", self.rlentime),
            Field::i64("rlastupdate", self.rlastupdate),
            Field::u64("wcnt", self.wcnt),
            Field::u64("rcnt", self.rcnt),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::layout::{BlobWriter, DataModel};
    use crate::model::{FieldType, KstatHeader, KstatId, KstatType};

    fn io_record(data: Vec<u8>) -> StatisticRecord {
        StatisticRecord {
            header: KstatHeader {
                id: KstatId::new("sd", 0, "sd0"),
                class: "disk".into(),
                kstat_type: KstatType::Io,
                crtime: 1,
            },
            snaptime: 2,
            ndata: 1,
            data,
            strings: Vec::new(),
        }
    }

    #[test]
    fn test_kstat_io_is_80_bytes_on_both_models() {
        assert_eq!(KSTAT_IO.compile(DataModel::Lp64).size, 80);
        assert_eq!(KSTAT_IO.compile(DataModel::Ilp32).size, 80);
        let offsets: Vec<usize> = KSTAT_IO
            .compile(DataModel::Lp64)
            .members
            .iter()
            .map(|m| m.offset)
            .collect();
        assert_eq!(offsets, vec![0, 8, 16, 20, 24, 32, 40, 48, 56, 64, 72, 76]);
    }

    #[test]
    fn test_decode_and_emit_order() {
        let layout = KSTAT_IO.compile(DataModel::NATIVE);
        let blob = BlobWriter::new(&layout)
            .set_u64("nread", 1 << 33)
            .set_u64("nwritten", 4096)
            .set("reads", 10)
            .set("writes", 20)
            .set("wtime", 1_000)
            .set("rtime", 2_000)
            .set("rlastupdate", -5)
            .set("wcnt", 1)
            .set("rcnt", 3)
            .finish();
        let io = IoFields::decode(&io_record(blob), &layout).unwrap();
        assert_eq!(io.nread, 1 << 33);
        assert_eq!(io.reads, 10);
        assert_eq!(io.rlastupdate, -5);
        assert_eq!(io.rcnt, 3);

        let fields = io.fields();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, IO_FIELD_NAMES);
        assert!(fields.iter().all(|f| matches!(
            f.field_type,
            FieldType::Int64 | FieldType::UInt64
        )));
    }

    #[test]
    fn test_short_blob_is_truncated() {
        let layout = KSTAT_IO.compile(DataModel::NATIVE);
        let err = IoFields::decode(&io_record(vec![0; 40]), &layout).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { needed: 80, actual: 40, .. }));
    }
}
