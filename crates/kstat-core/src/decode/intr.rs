//! Decoder for `KSTAT_TYPE_INTR` records (`kstat_intr_t`).

use crate::decode::DecodeError;
use crate::decode::layout::read_scalar;
use crate::model::{Field, FieldType, StatisticRecord};

/// Counter names, indexed by `KSTAT_INTR_HARD` .. `KSTAT_INTR_MULTSVC`.
///
/// These are the names the perl `Sun::Solaris::Kstat` module uses; callers
/// depend on them.
pub const INTR_FIELD_NAMES: [&str; 5] = ["hard", "soft", "watchdog", "spurious", "multiple_service"];

/// `sizeof (kstat_intr_t)`: `uint_t intrs[KSTAT_NUM_INTRS]`.
pub const KSTAT_INTR_SIZE: usize = 4 * INTR_FIELD_NAMES.len();

/// Decodes the five interrupt counters.
pub fn intr_fields(record: &StatisticRecord) -> Result<Vec<Field>, DecodeError> {
    if record.data.len() < KSTAT_INTR_SIZE {
        return Err(DecodeError::Truncated {
            what: "kstat_intr_t",
            needed: KSTAT_INTR_SIZE,
            actual: record.data.len(),
        });
    }
    Ok(INTR_FIELD_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let raw = &record.data[i * 4..i * 4 + 4];
            Field::numeric(*name, FieldType::UInt32, read_scalar(raw, false))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KstatHeader, KstatId, KstatType, Numeric};

    fn intr_record(counts: &[u32]) -> StatisticRecord {
        StatisticRecord {
            header: KstatHeader {
                id: KstatId::new("pcieb", 0, "pcieb0"),
                class: "controller".into(),
                kstat_type: KstatType::Intr,
                crtime: 0,
            },
            snaptime: 0,
            ndata: 1,
            data: counts.iter().flat_map(|c| c.to_ne_bytes()).collect(),
            strings: Vec::new(),
        }
    }

    #[test]
    fn test_five_named_counters() {
        let fields = intr_fields(&intr_record(&[100, 2, 0, 7, u32::MAX])).unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, INTR_FIELD_NAMES);
        assert_eq!(fields[0].value.as_numeric(), Some(Numeric::Unsigned(100)));
        assert_eq!(fields[4].value.as_numeric(), Some(Numeric::Unsigned(u32::MAX as u64)));
        assert!(fields.iter().all(|f| f.field_type == FieldType::UInt32));
    }

    #[test]
    fn test_truncated() {
        assert!(intr_fields(&intr_record(&[1, 2, 3])).is_err());
    }
}
