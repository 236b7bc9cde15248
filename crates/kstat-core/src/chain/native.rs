//! `libkstat` binding for illumos and Solaris.

#![allow(non_camel_case_types)]

use std::ffi::{CStr, CString};
use std::io;
use std::ptr;

use libc::{c_char, c_int, c_longlong, c_uchar, c_uint, c_void, size_t};
use tracing::{debug, trace};

use super::{ChainError, ChainId, KstatChain};
use crate::decode::named::{KSTAT_STRLEN, NAMED_ENTRY_SIZE, NAMED_TYPE_OFFSET, NAMED_VALUE_OFFSET};
use crate::model::{FieldType, KstatHeader, KstatId, KstatType, StatisticRecord};

type hrtime_t = c_longlong;
type kid_t = c_int;

#[repr(C)]
struct kstat_ctl_t {
    kc_chain_id: kid_t,
    kc_chain: *mut kstat_t,
    kc_kd: c_int,
}

// Only the public prefix of `kstat_t`; instances are always owned by libkstat.
#[repr(C)]
struct kstat_t {
    ks_crtime: hrtime_t,
    ks_next: *mut kstat_t,
    ks_kid: kid_t,
    ks_module: [c_char; KSTAT_STRLEN],
    ks_resv: c_uchar,
    ks_instance: c_int,
    ks_name: [c_char; KSTAT_STRLEN],
    ks_type: c_uchar,
    ks_class: [c_char; KSTAT_STRLEN],
    ks_flags: c_uchar,
    ks_data: *mut c_void,
    ks_ndata: c_uint,
    ks_data_size: size_t,
    ks_snaptime: hrtime_t,
}

#[link(name = "kstat")]
unsafe extern "C" {
    fn kstat_open() -> *mut kstat_ctl_t;
    fn kstat_close(kc: *mut kstat_ctl_t) -> c_int;
    fn kstat_chain_update(kc: *mut kstat_ctl_t) -> kid_t;
    fn kstat_lookup(
        kc: *mut kstat_ctl_t,
        module: *mut c_char,
        instance: c_int,
        name: *mut c_char,
    ) -> *mut kstat_t;
    fn kstat_read(kc: *mut kstat_ctl_t, ksp: *mut kstat_t, buf: *mut c_void) -> kid_t;
}

/// An open `kstat_ctl_t`. Closed on drop.
pub struct NativeChain {
    kc: *mut kstat_ctl_t,
}

// The handle is only ever used behind the session mutex.
unsafe impl Send for NativeChain {}

impl NativeChain {
    pub(crate) fn open() -> io::Result<Self> {
        // SAFETY: kstat_open has no preconditions.
        let kc = unsafe { kstat_open() };
        if kc.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { kc })
    }

    fn entries(&self) -> ChainIter<'_> {
        // SAFETY: kc is a live handle; the chain is only replaced by
        // kstat_chain_update, which needs &mut self.
        ChainIter {
            next: unsafe { (*self.kc).kc_chain },
            _chain: self,
        }
    }
}

impl Drop for NativeChain {
    fn drop(&mut self) {
        // SAFETY: kc came from kstat_open and is closed exactly once.
        unsafe {
            kstat_close(self.kc);
        }
    }
}

struct ChainIter<'a> {
    next: *mut kstat_t,
    _chain: &'a NativeChain,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a kstat_t;

    fn next(&mut self) -> Option<&'a kstat_t> {
        // SAFETY: entries of a live chain are valid until the next update.
        let ks = unsafe { self.next.as_ref()? };
        self.next = ks.ks_next;
        Some(ks)
    }
}

fn text(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn header(ks: &kstat_t) -> KstatHeader {
    KstatHeader {
        id: KstatId::new(text(&ks.ks_module), ks.ks_instance, text(&ks.ks_name)),
        class: text(&ks.ks_class),
        kstat_type: KstatType::from_tag(ks.ks_type),
        crtime: ks.ks_crtime,
    }
}

/// Copies the text behind every `KSTAT_DATA_STRING` pointer of a named
/// kstat. Must run before the chain lock is released.
fn detach_strings(data: &[u8], ndata: usize) -> Vec<Option<Vec<u8>>> {
    let count = ndata.min(data.len() / NAMED_ENTRY_SIZE);
    (0..count)
        .map(|i| {
            let entry = &data[i * NAMED_ENTRY_SIZE..(i + 1) * NAMED_ENTRY_SIZE];
            if entry[NAMED_TYPE_OFFSET] != FieldType::DATA_STRING {
                return None;
            }
            let mut addr = [0u8; size_of::<usize>()];
            addr.copy_from_slice(&entry[NAMED_VALUE_OFFSET..NAMED_VALUE_OFFSET + addr.len()]);
            let ptr = usize::from_ne_bytes(addr) as *const c_char;
            if ptr.is_null() {
                return None;
            }
            // SAFETY: libkstat points string values at memory inside the
            // snapshot buffer it just filled.
            Some(unsafe { CStr::from_ptr(ptr) }.to_bytes_with_nul().to_vec())
        })
        .collect()
}

impl KstatChain for NativeChain {
    fn chain_id(&self) -> ChainId {
        // SAFETY: kc is a live handle.
        unsafe { (*self.kc).kc_chain_id }
    }

    fn update(&mut self) -> io::Result<ChainId> {
        // SAFETY: kc is a live handle and &mut self excludes readers.
        let kid = unsafe { kstat_chain_update(self.kc) };
        if kid == -1 {
            return Err(io::Error::last_os_error());
        }
        if kid != 0 {
            trace!(chain_id = kid, "kstat chain changed");
        }
        Ok(self.chain_id())
    }

    fn headers(&self) -> Vec<KstatHeader> {
        self.entries().map(header).collect()
    }

    fn read(&mut self, id: &KstatId) -> Result<StatisticRecord, ChainError> {
        let module = CString::new(id.module.as_str()).map_err(|_| ChainError::NotFound)?;
        let name = CString::new(id.name.as_str()).map_err(|_| ChainError::NotFound)?;

        // SAFETY: kstat_lookup does not write through the name pointers.
        let ksp = unsafe {
            kstat_lookup(
                self.kc,
                module.as_ptr() as *mut c_char,
                id.instance,
                name.as_ptr() as *mut c_char,
            )
        };
        if ksp.is_null() {
            return Err(ChainError::NotFound);
        }

        // SAFETY: ksp belongs to this chain; a null buffer reads into the
        // kstat's own ks_data.
        if unsafe { kstat_read(self.kc, ksp, ptr::null_mut()) } == -1 {
            let e = io::Error::last_os_error();
            debug!(kstat = %id, error = %e, "kstat_read failed");
            return Err(ChainError::Read(e));
        }

        // SAFETY: ksp stays valid until the next chain update.
        let ks = unsafe { &*ksp };
        let data = if ks.ks_data.is_null() || ks.ks_data_size == 0 {
            Vec::new()
        } else {
            // SAFETY: kstat_read filled ks_data_size bytes at ks_data.
            unsafe { std::slice::from_raw_parts(ks.ks_data as *const u8, ks.ks_data_size) }
                .to_vec()
        };
        let kstat_type = KstatType::from_tag(ks.ks_type);
        let strings = if kstat_type == KstatType::Named {
            detach_strings(&data, ks.ks_ndata as usize)
        } else {
            Vec::new()
        };

        Ok(StatisticRecord {
            header: header(ks),
            snaptime: ks.ks_snaptime,
            ndata: ks.ks_ndata,
            data,
            strings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_read_system_misc() {
        let mut chain = NativeChain::open().unwrap();
        chain.update().unwrap();
        assert!(!chain.headers().is_empty());
        let rec = chain.read(&KstatId::new("unix", 0, "system_misc")).unwrap();
        assert_eq!(rec.header.kstat_type, KstatType::Named);
        assert!(rec.ndata > 0);
    }

    #[test]
    fn test_missing_is_not_found() {
        let mut chain = NativeChain::open().unwrap();
        let err = chain.read(&KstatId::new("zz", 0, "bogus")).unwrap_err();
        assert!(matches!(err, ChainError::NotFound));
    }
}
