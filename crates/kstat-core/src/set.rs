//! A tracked set of kstats that reports membership changes.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::chain::ChainId;
use crate::filter::KstatFilter;
use crate::model::{Kstat, KstatType};
use crate::source::KstatSource;

/// Identity-only JSON form of a set member.
#[derive(Serialize)]
struct Identity<'a> {
    class: &'a str,
    #[serde(rename = "type")]
    kstat_type: KstatType,
    module: &'a str,
    name: &'a str,
    instance: i32,
}

/// The kstats of a source, optionally narrowed by a filter.
///
/// Without a filter members carry metadata only; with one they are the
/// snapshots [`KstatFilter::select`] read. [`chain_update`] recomputes the
/// membership when the generation moves and records what came and went.
///
/// [`chain_update`]: KstatSet::chain_update
pub struct KstatSet<'a, S: KstatSource + ?Sized> {
    source: &'a S,
    filter: Option<KstatFilter>,
    title: String,
    chain_id: ChainId,
    current: BTreeSet<Kstat>,
    added: BTreeSet<Kstat>,
    deleted: BTreeSet<Kstat>,
}

impl<'a, S: KstatSource + ?Sized> KstatSet<'a, S> {
    /// Every kstat of `source`.
    pub fn new(source: &'a S) -> Self {
        Self::build(source, None, "all kstats".to_string())
    }

    /// The kstats of `source` that `filter` selects.
    pub fn with_filter(source: &'a S, filter: KstatFilter) -> Self {
        Self::build(source, Some(filter), "filtered kstats".to_string())
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    fn build(source: &'a S, filter: Option<KstatFilter>, title: String) -> Self {
        let chain_id = source.refresh();
        let mut set = Self {
            source,
            filter,
            title,
            chain_id,
            current: BTreeSet::new(),
            added: BTreeSet::new(),
            deleted: BTreeSet::new(),
        };
        set.current = set.load();
        set
    }

    fn load(&self) -> BTreeSet<Kstat> {
        match &self.filter {
            Some(filter) => filter.select(self.source).into_iter().collect(),
            None => self
                .source
                .headers()
                .iter()
                .map(Kstat::from_header)
                .collect(),
        }
    }

    /// Refreshes the source and recomputes the membership.
    ///
    /// Returns the new generation if kstats were added or deleted, `None`
    /// if the membership is unchanged. The added and deleted sets describe
    /// this call only.
    pub fn chain_update(&mut self) -> Option<ChainId> {
        let generation = self.source.refresh();
        if generation == self.chain_id {
            self.added.clear();
            self.deleted.clear();
            return None;
        }

        let fresh = self.load();
        self.added = fresh.difference(&self.current).cloned().collect();
        self.deleted = self.current.difference(&fresh).cloned().collect();
        debug!(
            title = %self.title,
            previous = self.chain_id,
            chain_id = generation,
            added = self.added.len(),
            deleted = self.deleted.len(),
            "kstat set updated"
        );
        self.chain_id = generation;
        self.current = fresh;

        if self.added.is_empty() && self.deleted.is_empty() {
            None
        } else {
            Some(generation)
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn source(&self) -> &'a S {
        self.source
    }

    pub fn kstats(&self) -> &BTreeSet<Kstat> {
        &self.current
    }

    pub fn added(&self) -> &BTreeSet<Kstat> {
        &self.added
    }

    pub fn deleted(&self) -> &BTreeSet<Kstat> {
        &self.deleted
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn modules(&self) -> BTreeSet<&str> {
        self.current.iter().map(Kstat::module).collect()
    }

    pub fn instances(&self) -> BTreeSet<i32> {
        self.current.iter().map(Kstat::instance).collect()
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.current.iter().map(Kstat::name).collect()
    }

    pub fn classes(&self) -> BTreeSet<&str> {
        self.current.iter().map(Kstat::class).collect()
    }

    /// JSON array of member identities: class, type, module, name and
    /// instance. Reads back with [`parse_kstats`](crate::parse::parse_kstats).
    pub fn to_json(&self) -> serde_json::Result<String> {
        let identities: Vec<Identity<'_>> = self
            .current
            .iter()
            .map(|ks| Identity {
                class: ks.class(),
                kstat_type: ks.kstat_type(),
                module: ks.module(),
                name: ks.name(),
                instance: ks.instance(),
            })
            .collect();
        serde_json::to_string(&identities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChain;
    use crate::decode::NamedBlob;
    use crate::parse::parse_kstats;
    use crate::session::Session;

    #[test]
    fn test_all_kstats() {
        let chain = MockChain::typical_system();
        let session = Session::new(chain.clone());
        let set = KstatSet::new(&session);
        assert_eq!(set.len(), chain.kernel_len());
        assert_eq!(set.title(), "all kstats");
        assert!(set.modules().contains("cpu_stat"));
        assert!(set.classes().contains("disk"));
        assert!(set.names().contains("sd1"));
        assert_eq!(set.instances().into_iter().collect::<Vec<_>>(), vec![0, 1]);
        assert!(set.kstats().iter().all(Kstat::is_empty));
    }

    #[test]
    fn test_chain_update_reports_changes() {
        let mut chain = MockChain::typical_system();
        let session = Session::new(chain.clone());
        let mut set = KstatSet::new(&session);
        assert_eq!(set.chain_update(), None);

        let mut blob = NamedBlob::new();
        blob.uint32("ports", 4);
        chain.add_named("usb", 2, "hub2", "usb", &blob);
        chain.remove("sd", 1, "sd1");

        let generation = set.chain_update();
        assert!(generation.is_some());
        assert_eq!(set.chain_id(), session.chain_id());
        let added: Vec<String> = set.added().iter().map(Kstat::triplet).collect();
        let deleted: Vec<String> = set.deleted().iter().map(Kstat::triplet).collect();
        assert_eq!(added, vec!["usb:2:hub2"]);
        assert_eq!(deleted, vec!["sd:1:sd1"]);

        assert_eq!(set.chain_update(), None);
        assert!(set.added().is_empty());
        assert!(set.deleted().is_empty());
    }

    #[test]
    fn test_filtered_set_ignores_unrelated_changes() {
        let mut chain = MockChain::typical_system();
        let session = Session::new(chain.clone());
        let mut filter = KstatFilter::new();
        filter.set_class("disk");
        let mut set = KstatSet::with_filter(&session, filter).titled("disks");
        assert_eq!(set.title(), "disks");
        assert_eq!(set.len(), 2);
        assert!(set.kstats().iter().all(|ks| ks.has_statistic("nread")));

        let mut blob = NamedBlob::new();
        blob.uint32("x", 1);
        chain.add_named("misc", 0, "other", "misc", &blob);
        assert_eq!(set.chain_update(), None);
        assert_eq!(set.chain_id(), session.chain_id());

        chain.add_io("sd", 2, "sd2", "disk", &Default::default());
        assert!(set.chain_update().is_some());
        assert_eq!(set.added().len(), 1);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_identities_json() {
        let session = Session::new(MockChain::typical_system());
        let mut filter = KstatFilter::new();
        filter.add_filter("cpu_stat").unwrap();
        let set = KstatSet::with_filter(&session, filter);

        let json = set.to_json().unwrap();
        let back = parse_kstats(&json).unwrap();
        let names: Vec<String> = back.iter().map(Kstat::triplet).collect();
        assert_eq!(names, vec!["cpu_stat:0:cpu_stat0", "cpu_stat:1:cpu_stat1"]);
        assert!(back.iter().all(|ks| ks.kstat_type() == KstatType::Raw && ks.is_empty()));
    }
}
