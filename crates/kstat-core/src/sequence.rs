//! Recorded kstat snapshots replayed as a source.
//!
//! A [`KstatSequence`] is an ordered list of frames, each a timestamp and
//! the kstats read at that moment. A cursor selects the current frame;
//! [`KstatSource`] calls answer from it, so sets, aggregates and rate
//! trackers step through a recording the same way they follow a live
//! chain.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::ChainId;
use crate::model::{Kstat, KstatHeader, KstatId};
use crate::parse::ParseError;
use crate::source::KstatSource;

/// On-disk form of one frame.
#[derive(Serialize, Deserialize)]
struct FrameRecord {
    timestamp: i64,
    kstats: Vec<Kstat>,
}

struct Frame {
    timestamp: i64,
    generation: ChainId,
    kstats: BTreeMap<KstatId, Kstat>,
}

/// Snapshots taken over time, walked with a cursor.
///
/// The generation starts at 1 and moves on whenever a frame holds a
/// different set of kstats from the frame before it.
#[derive(Default)]
pub struct KstatSequence {
    frames: Vec<Frame>,
    cursor: Cell<usize>,
}

impl KstatSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads frames written by [`to_json`](Self::to_json):
    /// `[{"timestamp": ms, "kstats": [..]}, ..]`.
    pub fn from_json(json: &str) -> Result<Self, ParseError> {
        let records: Vec<FrameRecord> = serde_json::from_str(json)?;
        let mut sequence = Self::new();
        for record in records {
            sequence.push(record.timestamp, record.kstats);
        }
        Ok(sequence)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let records: Vec<FrameRecord> = self
            .frames
            .iter()
            .map(|f| FrameRecord {
                timestamp: f.timestamp,
                kstats: f.kstats.values().cloned().collect(),
            })
            .collect();
        serde_json::to_string(&records)
    }

    /// Appends a frame taken at `timestamp` (milliseconds since the epoch).
    pub fn push(&mut self, timestamp: i64, kstats: Vec<Kstat>) {
        let kstats: BTreeMap<KstatId, Kstat> = kstats
            .into_iter()
            .map(|ks| (ks.id().clone(), ks))
            .collect();
        let generation = match self.frames.last() {
            None => 1,
            Some(last) if same_members(&last.kstats, &kstats) => last.generation,
            Some(last) => last.generation + 1,
        };
        debug!(
            frame = self.frames.len(),
            timestamp,
            generation,
            kstats = kstats.len(),
            "frame recorded"
        );
        self.frames.push(Frame {
            timestamp,
            generation,
            kstats,
        });
    }

    /// Appends a frame holding a fresh snapshot of every kstat of `source`.
    pub fn record<S: KstatSource + ?Sized>(&mut self, source: &S) {
        let kstats = source
            .headers()
            .iter()
            .filter_map(|h| source.get_kstat(&h.id.module, h.id.instance, &h.id.name))
            .collect();
        self.push(source.timestamp_millis(), kstats);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Current frame index.
    pub fn position(&self) -> usize {
        self.cursor.get()
    }

    /// Moves to the first frame.
    pub fn begin(&self) {
        self.cursor.set(0);
    }

    /// Moves to the next frame. `false` at the end.
    pub fn advance(&self) -> bool {
        let next = self.cursor.get() + 1;
        if next >= self.frames.len() {
            return false;
        }
        self.cursor.set(next);
        true
    }

    /// Moves to the previous frame. `false` at the start.
    pub fn rewind(&self) -> bool {
        match self.cursor.get().checked_sub(1) {
            Some(prev) => {
                self.cursor.set(prev);
                true
            }
            None => false,
        }
    }

    /// Moves to `position`. `false`, and no move, when out of range.
    pub fn jump_to(&self, position: usize) -> bool {
        if position >= self.frames.len() {
            return false;
        }
        self.cursor.set(position);
        true
    }

    fn current(&self) -> Option<&Frame> {
        self.frames.get(self.cursor.get())
    }
}

fn same_members(a: &BTreeMap<KstatId, Kstat>, b: &BTreeMap<KstatId, Kstat>) -> bool {
    a.keys().collect::<BTreeSet<_>>() == b.keys().collect::<BTreeSet<_>>()
}

impl KstatSource for KstatSequence {
    /// Recorded data does not change; the generation is the current frame's.
    fn refresh(&self) -> ChainId {
        self.chain_id()
    }

    fn chain_id(&self) -> ChainId {
        self.current().map_or(0, |f| f.generation)
    }

    fn headers(&self) -> Vec<KstatHeader> {
        self.current()
            .map(|f| f.kstats.values().map(Kstat::header).collect())
            .unwrap_or_default()
    }

    fn get_kstat(&self, module: &str, instance: i32, name: &str) -> Option<Kstat> {
        self.current()?
            .kstats
            .get(&KstatId::new(module, instance, name))
            .cloned()
    }

    fn timestamp_millis(&self) -> i64 {
        self.current().map_or(0, |f| f.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::KstatAggregate;
    use crate::chain::MockChain;
    use crate::decode::IoFields;
    use crate::rates::KstatRates;
    use crate::session::Session;
    use crate::set::KstatSet;

    fn disk(reads: u64) -> IoFields {
        IoFields {
            reads,
            ..IoFields::default()
        }
    }

    /// Three frames of a system whose second disk appears in the last one.
    fn recording() -> KstatSequence {
        let mut chain = MockChain::new();
        chain.add_io("sd", 0, "sd0", "disk", &disk(100));
        let session = Session::new(chain.clone());
        let mut sequence = KstatSequence::new();
        sequence.record(&session);

        chain.add_io("sd", 0, "sd0", "disk", &disk(300));
        sequence.record(&session);

        chain.add_io("sd", 0, "sd0", "disk", &disk(700));
        chain.add_io("sd", 1, "sd1", "disk", &disk(5));
        sequence.record(&session);
        sequence.begin();
        sequence
    }

    #[test]
    fn test_cursor() {
        let sequence = recording();
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.position(), 0);
        assert!(!sequence.rewind());
        assert!(sequence.advance());
        assert!(sequence.advance());
        assert!(!sequence.advance());
        assert_eq!(sequence.position(), 2);
        assert!(sequence.rewind());
        assert_eq!(sequence.position(), 1);
        assert!(!sequence.jump_to(3));
        assert!(sequence.jump_to(0));
        assert_eq!(sequence.position(), 0);
    }

    #[test]
    fn test_generation_follows_membership() {
        let sequence = recording();
        assert_eq!(sequence.chain_id(), 1);
        sequence.advance();
        assert_eq!(sequence.refresh(), 1);
        sequence.advance();
        assert_eq!(sequence.chain_id(), 2);
        assert_eq!(sequence.headers().len(), 2);
    }

    #[test]
    fn test_source_answers_from_current_frame() {
        let sequence = recording();
        let reads = |s: &KstatSequence| {
            s.get_kstat("sd", 0, "sd0")
                .and_then(|ks| ks.numeric("reads"))
                .map(|n| n.as_i64())
        };
        assert_eq!(reads(&sequence), Some(100));
        assert!(sequence.get_kstat("sd", 1, "sd1").is_none());
        sequence.jump_to(2);
        assert_eq!(reads(&sequence), Some(700));
        assert!(sequence.get_kstat("sd", 1, "sd1").is_some());
    }

    #[test]
    fn test_empty_sequence() {
        let sequence = KstatSequence::new();
        assert!(sequence.is_empty());
        assert_eq!(sequence.chain_id(), 0);
        assert_eq!(sequence.timestamp_millis(), 0);
        assert!(sequence.headers().is_empty());
        assert!(!sequence.advance());
    }

    #[test]
    fn test_json_replay() {
        let recorded = recording();
        let json = recorded.to_json().unwrap();
        let sequence = KstatSequence::from_json(&json).unwrap();
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.timestamp_millis(), recorded.timestamp_millis());

        let mut set = KstatSet::new(&sequence);
        assert_eq!(set.len(), 1);
        sequence.advance();
        assert_eq!(set.chain_update(), None);
        sequence.advance();
        assert_eq!(set.chain_update(), Some(2));
        let added: Vec<String> = set.added().iter().map(Kstat::triplet).collect();
        assert_eq!(added, vec!["sd:1:sd1"]);

        assert!(matches!(
            KstatSequence::from_json("{\"timestamp\":1}"),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn test_rates_over_recording() {
        let sequence = recording();
        let first = sequence.get_kstat("sd", 0, "sd0").unwrap().snaptime();
        let mut rates = KstatRates::io(&sequence, "sd", 0, "sd0").unwrap();

        sequence.advance();
        assert!(rates.update());
        let second = rates.kstat().snaptime();
        let expected = 200.0 * 1e9 / (second - first) as f64;
        assert!((rates.rate("r/s").unwrap() - expected).abs() < 1e-6 * expected);
        assert_eq!(rates.value("reads"), 300);

        let mut disks = KstatAggregate::from_set(KstatSet::new(&sequence));
        sequence.advance();
        disks.read();
        assert_eq!(disks.aggregate("reads"), 705);
    }
}
