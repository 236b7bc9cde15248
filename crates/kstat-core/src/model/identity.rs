//! Identity and snapshot types for entries of the kstat chain.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::util::natural_cmp;

/// Kind of payload a kstat carries (`ks_type`). Serialized as the
/// numeric tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum KstatType {
    Raw,
    Named,
    Intr,
    Io,
    Timer,
    Unknown(u8),
}

impl KstatType {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => KstatType::Raw,
            1 => KstatType::Named,
            2 => KstatType::Intr,
            3 => KstatType::Io,
            4 => KstatType::Timer,
            other => KstatType::Unknown(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            KstatType::Raw => 0,
            KstatType::Named => 1,
            KstatType::Intr => 2,
            KstatType::Io => 3,
            KstatType::Timer => 4,
            KstatType::Unknown(tag) => tag,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KstatType::Raw => "KSTAT_TYPE_RAW",
            KstatType::Named => "KSTAT_TYPE_NAMED",
            KstatType::Intr => "KSTAT_TYPE_INTR",
            KstatType::Io => "KSTAT_TYPE_IO",
            KstatType::Timer => "KSTAT_TYPE_TIMER",
            KstatType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for KstatType {
    fn from(tag: u8) -> Self {
        KstatType::from_tag(tag)
    }
}

impl From<KstatType> for u8 {
    fn from(kstat_type: KstatType) -> Self {
        kstat_type.tag()
    }
}

impl fmt::Display for KstatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KstatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KSTAT_TYPE_RAW" => Ok(KstatType::Raw),
            "KSTAT_TYPE_NAMED" => Ok(KstatType::Named),
            "KSTAT_TYPE_INTR" => Ok(KstatType::Intr),
            "KSTAT_TYPE_IO" => Ok(KstatType::Io),
            "KSTAT_TYPE_TIMER" => Ok(KstatType::Timer),
            other => Err(format!("unknown kstat type '{}'", other)),
        }
    }
}

/// The (module, instance, name) triplet naming one kstat.
///
/// Ordered by module, then instance, then name with [`natural_cmp`], so
/// `sd:0:sd9` sorts before `sd:0:sd10`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KstatId {
    pub module: String,
    pub instance: i32,
    pub name: String,
}

impl KstatId {
    pub fn new(module: impl Into<String>, instance: i32, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            instance,
            name: name.into(),
        }
    }
}

impl fmt::Display for KstatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.module, self.instance, self.name)
    }
}

impl Ord for KstatId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.module
            .cmp(&other.module)
            .then(self.instance.cmp(&other.instance))
            .then_with(|| natural_cmp(&self.name, &other.name))
    }
}

impl PartialOrd for KstatId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Chain-level metadata of one kstat, read without touching its payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KstatHeader {
    pub id: KstatId,
    /// `ks_class`, e.g. `"disk"`, `"net"`, `"misc"`.
    pub class: String,
    pub kstat_type: KstatType,
    /// Creation time in nanoseconds of `gethrtime()`.
    pub crtime: i64,
}

/// One point-in-time read of a kstat.
///
/// Produced by the chain for a single locate call and never cached. The
/// payload is the raw `ks_data` copy; decoders interpret it according to
/// `header.kstat_type`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatisticRecord {
    pub header: KstatHeader,
    /// `ks_snaptime` of this read.
    pub snaptime: i64,
    /// `ks_ndata`: element count (named entries, raw records, ...).
    pub ndata: u32,
    /// Copy of the `ks_data` buffer.
    pub data: Vec<u8>,
    /// Text behind `KSTAT_DATA_STRING` pointers, indexed by named entry.
    ///
    /// Pointers only stay valid while the chain is locked, so the chain
    /// copies the strings out when it reads the kstat. `None` marks a null
    /// pointer; entries of other types are `None` too.
    pub strings: Vec<Option<Vec<u8>>>,
}

impl StatisticRecord {
    pub fn id(&self) -> &KstatId {
        &self.header.id
    }

    /// Detached text for named entry `index`, if it had a non-null pointer.
    pub fn string_at(&self, index: usize) -> Option<&[u8]> {
        self.strings.get(index).and_then(|s| s.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kstat_type_names() {
        assert_eq!(KstatType::Named.to_string(), "KSTAT_TYPE_NAMED");
        assert_eq!(KstatType::Unknown(42).as_str(), "UNKNOWN");
        assert_eq!("KSTAT_TYPE_IO".parse::<KstatType>(), Ok(KstatType::Io));
        assert!("KSTAT_TYPE_BOGUS".parse::<KstatType>().is_err());
        assert_eq!(KstatType::from_tag(2), KstatType::Intr);
        assert_eq!(KstatType::from_tag(9).tag(), 9);
    }

    #[test]
    fn test_kstat_id_display() {
        let id = KstatId::new("unix", 0, "system_misc");
        assert_eq!(id.to_string(), "unix:0:system_misc");
    }

    #[test]
    fn test_kstat_id_ordering() {
        let mut ids = vec![
            KstatId::new("sd", 0, "sd10"),
            KstatId::new("cpu_stat", 1, "cpu_stat1"),
            KstatId::new("sd", 0, "sd9"),
            KstatId::new("cpu_stat", 0, "cpu_stat0"),
        ];
        ids.sort();
        let names: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "cpu_stat:0:cpu_stat0",
                "cpu_stat:1:cpu_stat1",
                "sd:0:sd9",
                "sd:0:sd10",
            ]
        );
    }

    #[test]
    fn test_string_at_handles_missing_entries() {
        let record = StatisticRecord {
            header: KstatHeader {
                id: KstatId::new("m", 0, "n"),
                class: "misc".into(),
                kstat_type: KstatType::Named,
                crtime: 0,
            },
            snaptime: 0,
            ndata: 0,
            data: Vec::new(),
            strings: vec![None, Some(b"zone".to_vec())],
        };
        assert_eq!(record.string_at(0), None);
        assert_eq!(record.string_at(1), Some(&b"zone"[..]));
        assert_eq!(record.string_at(5), None);
    }
}
