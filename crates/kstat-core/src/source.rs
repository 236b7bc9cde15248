//! Where kstats come from.
//!
//! ```text
//!             ┌──────────────┐
//!             │ KstatSource  │ (trait)
//!             └──────┬───────┘
//!          ┌─────────┴─────────┐
//!     ┌────┴────┐        ┌─────┴────────┐
//!     │ Session │        │ KstatSequence│
//!     │ (live)  │        │ (recorded)   │
//!     └─────────┘        └──────────────┘
//! ```
//!
//! Sets, aggregates and rate trackers work against this trait, so the same
//! code runs on a live chain and on snapshots read back from JSON.

use crate::chain::ChainId;
use crate::model::{Kstat, KstatHeader};
use crate::session::Session;

/// A readable collection of kstats with a generation counter.
pub trait KstatSource {
    /// Brings the source up to date and returns its generation.
    fn refresh(&self) -> ChainId;

    /// Generation last seen, without refreshing.
    fn chain_id(&self) -> ChainId;

    /// Refreshes and lists every kstat.
    fn headers(&self) -> Vec<KstatHeader>;

    /// A current snapshot of one kstat, or `None` if it is not there.
    fn get_kstat(&self, module: &str, instance: i32, name: &str) -> Option<Kstat>;

    /// Time of the current data, in milliseconds since the epoch.
    fn timestamp_millis(&self) -> i64;

    /// Fresh snapshot of a kstat already in hand.
    fn reread(&self, kstat: &Kstat) -> Option<Kstat> {
        self.get_kstat(kstat.module(), kstat.instance(), kstat.name())
    }
}

impl KstatSource for Session {
    fn refresh(&self) -> ChainId {
        Session::refresh(self)
    }

    fn chain_id(&self) -> ChainId {
        Session::chain_id(self)
    }

    fn headers(&self) -> Vec<KstatHeader> {
        self.enumerate().collect()
    }

    fn get_kstat(&self, module: &str, instance: i32, name: &str) -> Option<Kstat> {
        Session::get_kstat(self, module, instance, name)
    }

    fn timestamp_millis(&self) -> i64 {
        Session::time_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChain;

    fn list<S: KstatSource + ?Sized>(source: &S) -> usize {
        source.headers().len()
    }

    #[test]
    fn test_session_as_source() {
        let chain = MockChain::typical_system();
        let session = Session::new(chain.clone());
        let source: &dyn KstatSource = &session;
        assert_eq!(list(source), chain.kernel_len());
        assert_eq!(source.refresh(), source.chain_id());

        let ks = source.get_kstat("unix", 0, "system_misc").unwrap();
        let again = source.reread(&ks).unwrap();
        assert!(again.snaptime() > ks.snaptime());
        assert!(source.timestamp_millis() > 0);
    }
}
