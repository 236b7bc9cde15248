mod field;
mod identity;
mod kstat;

pub use field::{Field, FieldType, FieldValue, MISSING_TEXT, Numeric, UNSUPPORTED_TEXT};
pub use identity::{KstatHeader, KstatId, KstatType, StatisticRecord};
pub use kstat::{Kstat, KstatData};
