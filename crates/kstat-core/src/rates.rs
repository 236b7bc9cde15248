//! Per-second rates between successive snapshots of one kstat.
//!
//! [`KstatRates::new`] tracks every numeric statistic of a kstat.
//! [`KstatRates::io`] derives the `iostat -x` columns from an IO kstat.
//! The first update measures from the kstat's creation time, so the
//! initial rates are averages over its lifetime.

use std::collections::{BTreeMap, HashMap};

use crate::model::Kstat;
use crate::source::KstatSource;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Counters an IO kstat's rates are derived from.
const IO_COUNTERS: [&str; 8] = [
    "reads", "writes", "nread", "nwritten", "rtime", "wtime", "rlentime", "wlentime",
];

// ---------------------------------------------------------------------------
// Delta helpers
// ---------------------------------------------------------------------------

/// Counter delta, `None` on regression (counter reset or kstat recreated).
fn delta(curr: i64, prev: i64) -> Option<i64> {
    (curr >= prev).then(|| curr - prev)
}

fn counter(ks: &Kstat, statistic: &str) -> i64 {
    ks.numeric(statistic).map_or(0, |n| n.as_i64())
}

// ---------------------------------------------------------------------------
// Rate state
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RateKind {
    Statistics,
    Io,
}

/// Rate tracking state for one kstat.
pub struct KstatRates<'a, S: KstatSource + ?Sized> {
    source: &'a S,
    kind: RateKind,
    kstat: Kstat,
    last_snap: i64,
    values: HashMap<String, i64>,
    rates: BTreeMap<String, f64>,
}

impl<'a, S: KstatSource + ?Sized> KstatRates<'a, S> {
    /// Tracks every numeric statistic. `None` if the kstat is not there.
    pub fn new(source: &'a S, module: &str, instance: i32, name: &str) -> Option<Self> {
        let kstat = source.get_kstat(module, instance, name)?;
        let values = kstat
            .statistics()
            .filter(|s| kstat.is_numeric(s))
            .map(|s| (s.to_string(), 0))
            .collect();
        Self::start(source, RateKind::Statistics, kstat, values)
    }

    /// Tracks the derived IO columns `r/s`, `w/s`, `kr/s`, `kw/s`, `wait`,
    /// `actv`, `svc_t`, `wsvc_t`, `asvc_t`, `%w` and `%b`.
    pub fn io(source: &'a S, module: &str, instance: i32, name: &str) -> Option<Self> {
        let kstat = source.get_kstat(module, instance, name)?;
        let values = IO_COUNTERS.iter().map(|s| (s.to_string(), 0)).collect();
        Self::start(source, RateKind::Io, kstat, values)
    }

    fn start(source: &'a S, kind: RateKind, kstat: Kstat, values: HashMap<String, i64>) -> Option<Self> {
        let mut rates = Self {
            source,
            kind,
            last_snap: kstat.crtime(),
            kstat,
            values,
            rates: BTreeMap::new(),
        };
        rates.apply(rates.kstat.clone());
        Some(rates)
    }

    /// Takes a new snapshot and recomputes the rates. `false` if the kstat
    /// has gone away; the previous rates are kept.
    pub fn update(&mut self) -> bool {
        match self.source.reread(&self.kstat) {
            Some(ks) => {
                self.apply(ks);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, ks: Kstat) {
        let dt = (ks.snaptime() - self.last_snap) as f64;
        self.last_snap = ks.snaptime();
        if dt > 0.0 {
            match self.kind {
                RateKind::Statistics => self.update_statistics(&ks, dt),
                RateKind::Io => self.update_io(&ks, dt),
            }
        }
        for (statistic, value) in self.values.iter_mut() {
            *value = counter(&ks, statistic);
        }
        self.kstat = ks;
    }

    fn update_statistics(&mut self, ks: &Kstat, dt: f64) {
        for (statistic, prev) in &self.values {
            match delta(counter(ks, statistic), *prev) {
                Some(d) => {
                    self.rates.insert(statistic.clone(), d as f64 * NANOS_PER_SEC / dt);
                }
                None => {
                    self.rates.remove(statistic);
                }
            }
        }
    }

    fn update_io(&mut self, ks: &Kstat, dt: f64) {
        let deltas: Option<Vec<i64>> = IO_COUNTERS
            .iter()
            .map(|s| delta(counter(ks, s), self.value(s)))
            .collect();
        let Some(d) = deltas else {
            self.rates.clear();
            return;
        };
        let [reads, writes, nread, nwritten, rtime, wtime, rlentime, wlentime] =
            [d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]].map(|v| v as f64);

        let wait = wlentime / dt;
        let actv = rlentime / dt;
        let per_sec = |ops: f64| ops * NANOS_PER_SEC / dt;
        // Milliseconds per operation: queue length over throughput.
        let service = |queue: f64, ops: f64| {
            if ops == 0.0 { 0.0 } else { queue * 1000.0 / per_sec(ops) }
        };

        self.rates = BTreeMap::from([
            ("r/s".to_string(), per_sec(reads)),
            ("w/s".to_string(), per_sec(writes)),
            ("kr/s".to_string(), per_sec(nread) / 1024.0),
            ("kw/s".to_string(), per_sec(nwritten) / 1024.0),
            ("wait".to_string(), wait),
            ("actv".to_string(), actv),
            ("svc_t".to_string(), service(wait + actv, reads + writes)),
            ("wsvc_t".to_string(), service(wait, writes)),
            ("asvc_t".to_string(), service(actv, reads)),
            ("%w".to_string(), 100.0 * wtime / dt),
            ("%b".to_string(), 100.0 * rtime / dt),
        ]);
    }

    /// Names that currently have a rate, sorted.
    pub fn statistics(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    /// Per-second rate, or the derived IO value, of `statistic`.
    pub fn rate(&self, statistic: &str) -> Option<f64> {
        self.rates.get(statistic).copied()
    }

    /// Counter value at the last snapshot; 0 if not tracked.
    pub fn value(&self, statistic: &str) -> i64 {
        self.values.get(statistic).copied().unwrap_or(0)
    }

    /// The last snapshot.
    pub fn kstat(&self) -> &Kstat {
        &self.kstat
    }
}
