//! Caller-side cache of the chain's identities.
//!
//! Enumerating the whole chain is the expensive part of browsing kstats.
//! [`KstatCache`] keeps the last enumeration and only repeats it when the
//! chain generation has moved on.

use std::collections::HashMap;

use tracing::debug;

use crate::chain::ChainId;
use crate::model::{Kstat, KstatId};
use crate::session::Session;

/// Identities of a session's chain, re-enumerated on generation change.
#[derive(Debug)]
pub struct KstatCache<'s> {
    session: &'s Session,
    kstats: HashMap<KstatId, Kstat>,
    generation: Option<ChainId>,
}

impl<'s> KstatCache<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self {
            session,
            kstats: HashMap::new(),
            generation: None,
        }
    }

    /// Generation of the cached identities; `None` before the first
    /// enumeration.
    pub fn generation(&self) -> Option<ChainId> {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.kstats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kstats.is_empty()
    }

    /// Every kstat in the chain, sorted. Entries carry metadata only, unless
    /// they were read through [`get_kstat`](KstatCache::get_kstat).
    pub fn kstats(&mut self) -> Vec<Kstat> {
        let current = self.session.refresh();
        if self.generation != Some(current) {
            self.kstats.clear();
            let enumeration = self.session.enumerate();
            let generation = enumeration.generation();
            for header in enumeration {
                self.kstats
                    .insert(header.id.clone(), Kstat::from_header(&header));
            }
            debug!(
                previous = ?self.generation,
                chain_id = generation,
                kstats = self.kstats.len(),
                "kstat identities re-enumerated"
            );
            self.generation = Some(generation);
        }
        let mut list: Vec<Kstat> = self.kstats.values().cloned().collect();
        list.sort();
        list
    }

    /// Reads a kstat and keeps the cache in step with the result: a kstat
    /// that is gone is dropped, one that is found is stored.
    pub fn get_kstat(&mut self, module: &str, instance: i32, name: &str) -> Option<Kstat> {
        match self.session.get_kstat(module, instance, name) {
            Some(ks) => {
                self.kstats.insert(ks.id().clone(), ks.clone());
                Some(ks)
            }
            None => {
                self.kstats.remove(&KstatId::new(module, instance, name));
                None
            }
        }
    }
}
