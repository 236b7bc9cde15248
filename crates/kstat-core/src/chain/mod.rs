//! Access to the kernel's kstat chain.
//!
//! [`KstatChain`] is the seam between the session and the kernel. The
//! illumos implementation talks to `libkstat`; [`MockChain`] keeps a chain
//! in memory so everything above it can be tested on any host.
//!
//! ```text
//!                 ┌──────────────┐
//!                 │   Session    │
//!                 └──────┬───────┘
//!                        │ Mutex
//!                 ┌──────▼───────┐
//!                 │  KstatChain  │ (trait)
//!                 └──────┬───────┘
//!              ┌─────────┴─────────┐
//!       ┌──────▼──────┐     ┌──────▼──────┐
//!       │ NativeChain │     │  MockChain  │
//!       │  (illumos)  │     │  (testing)  │
//!       └─────────────┘     └─────────────┘
//! ```

pub mod mock;
#[cfg(any(target_os = "illumos", target_os = "solaris"))]
mod native;

use std::fmt;
use std::io;

use crate::model::{KstatHeader, KstatId, StatisticRecord};

pub use mock::MockChain;
#[cfg(any(target_os = "illumos", target_os = "solaris"))]
pub use native::NativeChain;

/// Chain generation, `kc_chain_id`.
pub type ChainId = i32;

/// Failure to produce a snapshot for one kstat.
#[derive(Debug)]
pub enum ChainError {
    /// No entry with this identity in the current chain.
    NotFound,
    /// The entry was found but reading it failed, typically because the
    /// kernel removed it in between.
    Read(io::Error),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::NotFound => write!(f, "kstat not found in chain"),
            ChainError::Read(e) => write!(f, "kstat read failed: {}", e),
        }
    }
}

impl std::error::Error for ChainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChainError::NotFound => None,
            ChainError::Read(e) => Some(e),
        }
    }
}

impl From<io::Error> for ChainError {
    fn from(e: io::Error) -> Self {
        ChainError::Read(e)
    }
}

/// A kstat chain.
///
/// Implementations are not required to be `Sync`: the session serializes
/// every call behind its own lock.
pub trait KstatChain: Send {
    /// Generation of the chain as last updated.
    fn chain_id(&self) -> ChainId;

    /// Brings the chain up to date with the kernel and returns the
    /// resulting generation. On error the previous chain stays usable.
    fn update(&mut self) -> io::Result<ChainId>;

    /// Identity of every entry, in chain order.
    fn headers(&self) -> Vec<KstatHeader>;

    /// Takes a fresh snapshot of one entry.
    fn read(&mut self, id: &KstatId) -> Result<StatisticRecord, ChainError>;
}

impl<C: KstatChain + ?Sized> KstatChain for Box<C> {
    fn chain_id(&self) -> ChainId {
        (**self).chain_id()
    }

    fn update(&mut self) -> io::Result<ChainId> {
        (**self).update()
    }

    fn headers(&self) -> Vec<KstatHeader> {
        (**self).headers()
    }

    fn read(&mut self, id: &KstatId) -> Result<StatisticRecord, ChainError> {
        (**self).read(id)
    }
}
