//! kstat-core — reading illumos/Solaris kernel statistics.
//!
//! Provides:
//! - `chain` — the kstat chain handle (`KstatChain`), native and mock backends
//! - `session` — process-wide chain session: locate, enumerate, read
//! - `decode` — payload decoders for named, I/O, interrupt and raw kstats
//! - `model` — identities, field values and the `Kstat` snapshot
//! - `sink` — callbacks that receive enumerated identities and decoded fields
//! - `filter` — `module:instance:name:statistic` selection
//! - `cache` — identity cache keyed on the chain generation
//! - `source` — the `KstatSource` trait over live and recorded data
//! - `set` — tracked kstat sets reporting added and deleted members
//! - `aggregate` — sums and averages across many kstats
//! - `rates` — per-second rates between snapshots
//! - `parse`, `sequence` — JSON read-back and recorded snapshot replay
//! - `util` — natural string ordering
//!
//! ```text
//!  KstatChain ──► Session ──► Decoder ──► KstatSink
//!  (native/mock)    │                    (Kstat, ...)
//!                   └── enumerate ──► IdentitySink
//! ```
//!
//! Hosts without kstat use [`MockChain::typical_system`]:
//!
//! ```
//! use kstat_core::{MockChain, Session};
//!
//! let session = Session::new(MockChain::typical_system());
//! let misc = session.get_kstat("unix", 0, "system_misc").unwrap();
//! assert!(misc.has_statistic("ncpus"));
//! ```

pub mod aggregate;
pub mod cache;
pub mod chain;
pub mod decode;
pub mod filter;
pub mod model;
pub mod parse;
pub mod rates;
pub mod sequence;
pub mod session;
pub mod set;
pub mod sink;
pub mod source;
pub mod util;

pub use aggregate::KstatAggregate;
pub use cache::KstatCache;
pub use chain::{KstatChain, MockChain};
pub use decode::{DecodeError, Decoder};
pub use filter::KstatFilter;
pub use model::Kstat;
pub use parse::{ParseError, parse_kstat, parse_kstats};
pub use rates::KstatRates;
pub use sequence::KstatSequence;
pub use session::{Session, SessionError};
pub use set::KstatSet;
pub use sink::{IdentitySink, KstatSink};
pub use source::KstatSource;
