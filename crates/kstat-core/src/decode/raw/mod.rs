//! Decoders for `KSTAT_TYPE_RAW` records.
//!
//! Raw kstats carry no schema: the payload is a copy of some kernel struct
//! and only its (module, name) says which. The [`RawRegistry`] maps those
//! keys to a decoder and refuses everything else. Guessing at an unknown
//! blob would produce plausible-looking garbage, so an unregistered key is
//! always [`DecodeError::UnsupportedLayout`].

pub mod tables;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use tracing::debug;

use crate::decode::DecodeError;
use crate::decode::layout::{CompiledLayout, DataModel, Layout, read_scalar};
use crate::model::{Field, FieldType, StatisticRecord};

/// How a registered raw kstat is laid out.
#[derive(Clone, Copy, Debug)]
pub enum RawLayout {
    /// One native struct at the start of the blob.
    Struct(&'static Layout),
    /// `mm:*:phys_installed`: `ks_ndata` × `{ uint64_t address; uint64_t size; }`.
    PhysInstalled,
}

/// A registry key: `name: None` matches every name within the module.
#[derive(Clone, Copy, Debug)]
pub struct RawEntry {
    pub module: &'static str,
    pub name: Option<&'static str>,
    pub layout: RawLayout,
}

/// Every raw kstat this crate knows how to decode.
pub static RAW_LAYOUTS: &[RawEntry] = &[
    RawEntry {
        module: "unix",
        name: Some("var"),
        layout: RawLayout::Struct(&tables::VAR),
    },
    RawEntry {
        module: "unix",
        name: Some("ncstats"),
        layout: RawLayout::Struct(&tables::NCSTATS),
    },
    RawEntry {
        module: "unix",
        name: Some("sysinfo"),
        layout: RawLayout::Struct(&tables::SYSINFO),
    },
    RawEntry {
        module: "unix",
        name: Some("vminfo"),
        layout: RawLayout::Struct(&tables::VMINFO),
    },
    RawEntry {
        module: "nfs",
        name: Some("mntinfo"),
        layout: RawLayout::Struct(&tables::MNTINFO),
    },
    RawEntry {
        module: "cpu_stat",
        name: None,
        layout: RawLayout::Struct(&tables::CPU_STAT),
    },
    RawEntry {
        module: "mm",
        name: Some("phys_installed"),
        layout: RawLayout::PhysInstalled,
    },
];

/// Raw kstats whose contents are known to be unreliable. They are never
/// decoded, even if a layout were registered for them.
pub static IGNORED_RAW: &[(&str, &str)] = &[
    ("unix", "sfmmu_percpu_stat"),
    ("ufs directio", "UFS DirectIO Stats"),
    ("sockfs", "sock_unix_list"),
];

/// Size of one `phys_installed` record.
pub const MEMUNIT_SIZE: usize = 16;

/// A registered decoder with its layout compiled for one data model.
#[derive(Clone, Debug)]
pub enum RawDecoder {
    Struct(CompiledLayout),
    PhysInstalled,
}

impl RawDecoder {
    pub fn decode(&self, record: &StatisticRecord) -> Result<Vec<Field>, DecodeError> {
        match self {
            RawDecoder::Struct(layout) => layout.decode(&record.data),
            RawDecoder::PhysInstalled => phys_installed(record),
        }
    }
}

#[derive(Debug, Default)]
struct ModuleDecoders {
    by_name: HashMap<&'static str, RawDecoder>,
    any_name: Option<RawDecoder>,
}

/// Dispatch table from (module, name) to raw decoder.
///
/// Built once per data model; decoders are pure and share no state, so a
/// registry can be used from any number of threads.
#[derive(Debug)]
pub struct RawRegistry {
    model: DataModel,
    modules: HashMap<&'static str, ModuleDecoders>,
}

static NATIVE: LazyLock<Arc<RawRegistry>> =
    LazyLock::new(|| Arc::new(RawRegistry::new(DataModel::NATIVE)));

impl RawRegistry {
    /// Compiles every entry of [`RAW_LAYOUTS`] for `model`.
    pub fn new(model: DataModel) -> Self {
        let mut modules: HashMap<&'static str, ModuleDecoders> = HashMap::new();
        for entry in RAW_LAYOUTS {
            let decoder = match entry.layout {
                RawLayout::Struct(layout) => RawDecoder::Struct(layout.compile(model)),
                RawLayout::PhysInstalled => RawDecoder::PhysInstalled,
            };
            let slot = modules.entry(entry.module).or_default();
            match entry.name {
                Some(name) => {
                    slot.by_name.insert(name, decoder);
                }
                None => slot.any_name = Some(decoder),
            }
        }
        Self { model, modules }
    }

    /// The registry for the running kernel's data model.
    pub fn native() -> Arc<RawRegistry> {
        Arc::clone(&NATIVE)
    }

    pub fn model(&self) -> DataModel {
        self.model
    }

    pub fn is_ignored(module: &str, name: &str) -> bool {
        IGNORED_RAW.iter().any(|(m, n)| *m == module && *n == name)
    }

    /// Finds the decoder for (module, name); exact names win over a
    /// module-wide entry.
    pub fn lookup(&self, module: &str, name: &str) -> Option<&RawDecoder> {
        if Self::is_ignored(module, name) {
            return None;
        }
        let decoders = self.modules.get(module)?;
        decoders.by_name.get(name).or(decoders.any_name.as_ref())
    }

    /// Decodes a raw record, or reports that its layout is not supported.
    pub fn decode(&self, record: &StatisticRecord) -> Result<Vec<Field>, DecodeError> {
        let id = record.id();
        match self.lookup(&id.module, &id.name) {
            Some(decoder) => decoder.decode(record),
            None => {
                if Self::is_ignored(&id.module, &id.name) {
                    debug!(kstat = %id, "raw kstat ignored by policy");
                } else {
                    debug!(kstat = %id, "no decoder for raw kstat");
                }
                Err(DecodeError::UnsupportedLayout {
                    module: id.module.clone(),
                    name: id.name.clone(),
                })
            }
        }
    }
}

/// One field per installed memory segment: key is the decimal start
/// address, value the segment size.
///
/// The record count comes from `ks_ndata`, never from the blob length.
fn phys_installed(record: &StatisticRecord) -> Result<Vec<Field>, DecodeError> {
    let count = record.ndata as usize;
    // An overflowing count cannot fit in any blob.
    let needed = count.checked_mul(MEMUNIT_SIZE).unwrap_or(usize::MAX);
    if record.data.len() < needed {
        return Err(DecodeError::Truncated {
            what: "phys_installed",
            needed,
            actual: record.data.len(),
        });
    }
    Ok(record.data[..needed]
        .chunks_exact(MEMUNIT_SIZE)
        .map(|unit| {
            let address = read_scalar(&unit[..8], false).as_u64();
            let size = read_scalar(&unit[8..], false);
            Field::numeric(address.to_string(), FieldType::UInt64, size)
        })
        .collect())
}
