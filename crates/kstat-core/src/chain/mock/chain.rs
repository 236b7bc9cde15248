//! In-memory kstat chain for testing without an illumos kernel.
//!
//! A `MockChain` has two halves, mirroring the real interface. The shared
//! kernel side holds the authoritative entries; every clone of the chain
//! sees the same kernel. Each handle keeps its own view of the chain, which
//! only catches up on [`update`](KstatChain::update). Removing an entry from
//! the kernel while a view still lists it reproduces a read failing after a
//! successful lookup.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::chain::{ChainError, ChainId, KstatChain};
use crate::decode::intr::INTR_FIELD_NAMES;
use crate::decode::io::KSTAT_IO;
use crate::decode::{BlobWriter, DataModel, IoFields, NamedBlob};
use crate::model::{KstatHeader, KstatId, KstatType, StatisticRecord};

/// Simulated time between two reads, in nanoseconds.
const TICK_NS: i64 = 1_000_000;

/// What `kstat_read` fails with for a kstat deleted under it.
const ENXIO: i32 = 6;

#[derive(Clone, Debug)]
struct MockEntry {
    header: KstatHeader,
    ndata: u32,
    data: Vec<u8>,
    strings: Vec<Option<Vec<u8>>>,
}

#[derive(Debug)]
struct Kernel {
    entries: Vec<MockEntry>,
    chain_id: ChainId,
    clock: i64,
    fail_updates: bool,
}

impl Default for Kernel {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            chain_id: 1,
            clock: 1_000_000_000,
            fail_updates: false,
        }
    }
}

/// In-memory kstat chain.
#[derive(Clone, Debug, Default)]
pub struct MockChain {
    kernel: Arc<Mutex<Kernel>>,
    view: Vec<KstatHeader>,
    view_id: ChainId,
}

impl MockChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    fn kernel(&self) -> MutexGuard<'_, Kernel> {
        self.kernel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an entry to the kernel side, replacing one with the same
    /// identity. Visible to this handle after the next update.
    fn insert(
        &mut self,
        id: KstatId,
        class: &str,
        kstat_type: KstatType,
        ndata: u32,
        data: Vec<u8>,
        strings: Vec<Option<Vec<u8>>>,
    ) -> &mut Self {
        {
            let mut kernel = self.kernel();
            kernel.clock += TICK_NS;
            let entry = MockEntry {
                header: KstatHeader {
                    id,
                    class: class.to_string(),
                    kstat_type,
                    crtime: kernel.clock,
                },
                ndata,
                data,
                strings,
            };
            match kernel.entries.iter_mut().find(|e| e.header.id == entry.header.id) {
                Some(existing) => *existing = entry,
                None => kernel.entries.push(entry),
            }
            kernel.chain_id += 1;
        }
        self
    }

    /// Adds a named kstat.
    pub fn add_named(
        &mut self,
        module: &str,
        instance: i32,
        name: &str,
        class: &str,
        blob: &NamedBlob,
    ) -> &mut Self {
        let (data, ndata, strings) = blob.finish();
        self.insert(
            KstatId::new(module, instance, name),
            class,
            KstatType::Named,
            ndata,
            data,
            strings,
        )
    }

    /// Adds a raw kstat with an arbitrary payload.
    pub fn add_raw(
        &mut self,
        module: &str,
        instance: i32,
        name: &str,
        class: &str,
        ndata: u32,
        data: Vec<u8>,
    ) -> &mut Self {
        self.insert(
            KstatId::new(module, instance, name),
            class,
            KstatType::Raw,
            ndata,
            data,
            Vec::new(),
        )
    }

    /// Adds an IO kstat holding a native `kstat_io_t`.
    pub fn add_io(
        &mut self,
        module: &str,
        instance: i32,
        name: &str,
        class: &str,
        io: &IoFields,
    ) -> &mut Self {
        let layout = KSTAT_IO.compile(DataModel::NATIVE);
        let data = BlobWriter::new(&layout)
            .set_u64("nread", io.nread)
            .set_u64("nwritten", io.nwritten)
            .set_u64("reads", io.reads)
            .set_u64("writes", io.writes)
            .set("wtime", io.wtime)
            .set("wlentime", io.wlentime)
            .set("wlastupdate", io.wlastupdate)
            .set("rtime", io.rtime)
            .set("rlentime", io.rlentime)
            .set("rlastupdate", io.rlastupdate)
            .set_u64("wcnt", io.wcnt)
            .set_u64("rcnt", io.rcnt)
            .finish();
        self.insert(
            KstatId::new(module, instance, name),
            class,
            KstatType::Io,
            1,
            data,
            Vec::new(),
        )
    }

    /// Adds an interrupt kstat; counts are hard, soft, watchdog, spurious,
    /// multiple service.
    pub fn add_intr(
        &mut self,
        module: &str,
        instance: i32,
        name: &str,
        class: &str,
        counts: [u32; INTR_FIELD_NAMES.len()],
    ) -> &mut Self {
        let data = counts.iter().flat_map(|c| c.to_ne_bytes()).collect();
        self.insert(
            KstatId::new(module, instance, name),
            class,
            KstatType::Intr,
            1,
            data,
            Vec::new(),
        )
    }

    /// Adds a timer kstat. Its payload is never decoded.
    pub fn add_timer(&mut self, module: &str, instance: i32, name: &str, class: &str) -> &mut Self {
        self.insert(
            KstatId::new(module, instance, name),
            class,
            KstatType::Timer,
            0,
            Vec::new(),
            Vec::new(),
        )
    }

    /// Removes an entry from the kernel side. Handles that already listed
    /// it keep doing so until they update, but can no longer read it.
    pub fn remove(&mut self, module: &str, instance: i32, name: &str) -> bool {
        let id = KstatId::new(module, instance, name);
        let mut kernel = self.kernel();
        let before = kernel.entries.len();
        kernel.entries.retain(|e| e.header.id != id);
        let removed = kernel.entries.len() != before;
        if removed {
            kernel.chain_id += 1;
        }
        removed
    }

    /// Makes every subsequent update fail, as if the kernel ran out of
    /// memory.
    pub fn set_fail_updates(&self, fail: bool) {
        self.kernel().fail_updates = fail;
    }

    /// Number of entries on the kernel side.
    pub fn kernel_len(&self) -> usize {
        self.kernel().entries.len()
    }

    /// Catches this handle up with the kernel without going through
    /// failure injection.
    pub(super) fn sync(&mut self) {
        let kernel = self.kernel();
        let view = kernel.entries.iter().map(|e| e.header.clone()).collect();
        let id = kernel.chain_id;
        drop(kernel);
        self.view = view;
        self.view_id = id;
    }
}

impl KstatChain for MockChain {
    fn chain_id(&self) -> ChainId {
        self.view_id
    }

    fn update(&mut self) -> io::Result<ChainId> {
        if self.kernel().fail_updates {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "kstat chain update failed"));
        }
        self.sync();
        Ok(self.view_id)
    }

    fn headers(&self) -> Vec<KstatHeader> {
        self.view.clone()
    }

    fn read(&mut self, id: &KstatId) -> Result<StatisticRecord, ChainError> {
        if !self.view.iter().any(|h| &h.id == id) {
            return Err(ChainError::NotFound);
        }
        let mut kernel = self.kernel();
        kernel.clock += TICK_NS;
        let snaptime = kernel.clock;
        let entry = kernel
            .entries
            .iter()
            .find(|e| &e.header.id == id)
            .ok_or_else(|| ChainError::Read(io::Error::from_raw_os_error(ENXIO)))?;
        Ok(StatisticRecord {
            header: entry.header.clone(),
            snaptime,
            ndata: entry.ndata,
            data: entry.data.clone(),
            strings: entry.strings.clone(),
        })
    }
}
