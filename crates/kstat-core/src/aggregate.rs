//! Sums and averages of one statistic across many kstats.

use crate::model::Kstat;
use crate::set::KstatSet;
use crate::source::KstatSource;

enum Members<'a, S: KstatSource + ?Sized> {
    /// Follows a set; membership is updated on every read.
    Dynamic(KstatSet<'a, S>),
    Fixed(Vec<Kstat>),
}

/// A group of kstats read together, e.g. every `cpu_stat` or every disk.
pub struct KstatAggregate<'a, S: KstatSource + ?Sized> {
    source: &'a S,
    members: Members<'a, S>,
    kstats: Vec<Kstat>,
    title: String,
}

impl<'a, S: KstatSource + ?Sized> KstatAggregate<'a, S> {
    /// Aggregates whatever `set` holds at each [`read`](Self::read).
    pub fn from_set(set: KstatSet<'a, S>) -> Self {
        let kstats = set.kstats().iter().cloned().collect();
        Self {
            source: set.source(),
            members: Members::Dynamic(set),
            kstats,
            title: "Aggregate".to_string(),
        }
    }

    /// Aggregates a fixed list of kstats.
    pub fn from_kstats(source: &'a S, kstats: Vec<Kstat>) -> Self {
        Self {
            source,
            members: Members::Fixed(kstats.clone()),
            kstats,
            title: "Aggregate".to_string(),
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Takes a fresh snapshot of every member. Members that have gone away
    /// are dropped from the result.
    pub fn read(&mut self) {
        let members: Vec<Kstat> = match &mut self.members {
            Members::Dynamic(set) => {
                set.chain_update();
                set.kstats().iter().cloned().collect()
            }
            Members::Fixed(list) => list.clone(),
        };
        self.kstats = members
            .iter()
            .filter_map(|ks| self.source.reread(ks))
            .collect();
    }

    /// The member snapshots from the last read.
    pub fn kstats(&self) -> &[Kstat] {
        &self.kstats
    }

    /// Sum of `statistic` over members where it is numeric.
    pub fn aggregate(&self, statistic: &str) -> i64 {
        self.kstats
            .iter()
            .filter_map(|ks| ks.numeric(statistic))
            .fold(0i64, |sum, n| sum.wrapping_add(n.as_i64()))
    }

    /// Mean of `statistic` over members where it is numeric; 0 if none is.
    pub fn average(&self, statistic: &str) -> f64 {
        let values: Vec<i64> = self
            .kstats
            .iter()
            .filter_map(|ks| ks.numeric(statistic))
            .map(|n| n.as_i64())
            .collect();
        if values.is_empty() {
            return 0.0;
        }
        values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
    }

    /// Earliest member creation time; `i64::MAX` with no members.
    pub fn crtime(&self) -> i64 {
        self.kstats.iter().map(Kstat::crtime).min().unwrap_or(i64::MAX)
    }

    /// Latest member snapshot time; 0 with no members.
    pub fn snaptime(&self) -> i64 {
        self.kstats.iter().map(Kstat::snaptime).max().unwrap_or(0)
    }
}
