//! The process-wide kstat session.
//!
//! A [`Session`] owns the chain handle and serializes every operation on it:
//! `libkstat` handles are not safe to use from two threads at once. Decoding
//! happens on owned snapshots after the lock is released.

use std::fmt;
use std::io;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::Utc;
use tracing::{debug, trace, warn};

use crate::chain::{ChainError, ChainId, KstatChain};
use crate::decode::{DecodeError, Decoder};
use crate::model::{Kstat, KstatHeader, KstatId, StatisticRecord};
use crate::sink::{IdentitySink, KstatSink};

static GLOBAL: SessionSlot = SessionSlot::new();

/// Failure to set up a session.
#[derive(Debug)]
pub enum SessionError {
    /// `kstat_open` failed: missing privilege or resource exhaustion.
    Open(io::Error),
    /// A process-wide session is already installed.
    AlreadyInitialized,
    /// This platform has no kstat facility.
    Unsupported,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Open(e) => write!(f, "cannot open kstat chain: {}", e),
            SessionError::AlreadyInitialized => write!(f, "kstat session already initialized"),
            SessionError::Unsupported => write!(f, "kstat is not available on this platform"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Open(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Open(e)
    }
}

/// Live connection to a kstat chain.
pub struct Session {
    chain: Mutex<Box<dyn KstatChain>>,
    decoder: Decoder,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("chain_id", &self.chain_id())
            .field("decoder", &self.decoder)
            .finish()
    }
}

impl Session {
    /// Wraps an already opened chain.
    pub fn new(chain: impl KstatChain + 'static) -> Self {
        Self::with_decoder(chain, Decoder::native())
    }

    pub fn with_decoder(chain: impl KstatChain + 'static, decoder: Decoder) -> Self {
        Self {
            chain: Mutex::new(Box::new(chain)),
            decoder,
        }
    }

    /// Opens the kernel's kstat chain. Only reachable through
    /// [`Session::init`], so a process holds at most one native handle.
    #[cfg(any(target_os = "illumos", target_os = "solaris"))]
    fn open() -> Result<Self, SessionError> {
        let chain = crate::chain::NativeChain::open()?;
        debug!(chain_id = chain.chain_id(), "kstat chain opened");
        Ok(Self::new(chain))
    }

    #[cfg(not(any(target_os = "illumos", target_os = "solaris")))]
    fn open() -> Result<Self, SessionError> {
        Err(SessionError::Unsupported)
    }

    /// Makes `session` the process-wide session.
    ///
    /// Only the first installation succeeds; any later one is a lifecycle
    /// bug and returns [`SessionError::AlreadyInitialized`]. The installed
    /// session lives until the process exits.
    pub fn install(session: Session) -> Result<&'static Session, SessionError> {
        GLOBAL.init_with(|| Ok(session))
    }

    /// Opens the kernel chain and installs it as the process-wide session.
    ///
    /// Once a session is installed this fails with
    /// [`SessionError::AlreadyInitialized`] without opening anything.
    pub fn init() -> Result<&'static Session, SessionError> {
        GLOBAL.init_with(Self::open)
    }

    /// The process-wide session, if one was installed.
    pub fn global() -> Option<&'static Session> {
        GLOBAL.session.get()
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    fn chain(&self) -> MutexGuard<'_, Box<dyn KstatChain>> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last seen chain generation, without refreshing.
    pub fn chain_id(&self) -> ChainId {
        self.chain().chain_id()
    }

    /// Brings the chain up to date and returns its generation.
    ///
    /// A failed update is logged and leaves the previous chain in use; the
    /// previous generation is returned.
    pub fn refresh(&self) -> ChainId {
        let mut chain = self.chain();
        let prior = chain.chain_id();
        match chain.update() {
            Ok(id) => {
                if id != prior {
                    debug!(prior, chain_id = id, "kstat chain changed");
                }
                id
            }
            Err(e) => {
                warn!(chain_id = prior, error = %e, "kstat chain update failed, keeping current chain");
                prior
            }
        }
    }

    /// Takes a fresh snapshot of one kstat.
    ///
    /// `None` when the kstat is not in the current chain, or when it
    /// vanished between lookup and read.
    pub fn locate(&self, module: &str, instance: i32, name: &str) -> Option<StatisticRecord> {
        let id = KstatId::new(module, instance, name);
        let result = self.chain().read(&id);
        match result {
            Ok(record) => {
                trace!(kstat = %id, ndata = record.ndata, bytes = record.data.len(), "kstat read");
                Some(record)
            }
            Err(ChainError::NotFound) => {
                debug!(kstat = %id, "kstat not in chain");
                None
            }
            Err(e @ ChainError::Read(_)) => {
                debug!(kstat = %id, error = %e, "kstat disappeared during read");
                None
            }
        }
    }

    /// Refreshes the chain and lists every entry in chain order.
    ///
    /// The listing is a snapshot: later chain changes do not affect an
    /// enumeration already returned.
    pub fn enumerate(&self) -> Enumeration {
        self.refresh();
        let chain = self.chain();
        Enumeration {
            generation: chain.chain_id(),
            headers: chain.headers().into_iter(),
        }
    }

    /// Refreshes the chain and passes every entry to `sink`. Returns the
    /// generation that was enumerated.
    pub fn enumerate_into<S: IdentitySink + ?Sized>(&self, sink: &mut S) -> ChainId {
        let enumeration = self.enumerate();
        let generation = enumeration.generation();
        for header in enumeration {
            sink.add_identity(header);
        }
        generation
    }

    /// Locates a kstat and streams it into `sink`.
    ///
    /// `None` if the kstat is not available; otherwise the decode outcome.
    pub fn read_into<S: KstatSink + ?Sized>(
        &self,
        module: &str,
        instance: i32,
        name: &str,
        sink: &mut S,
    ) -> Option<Result<(), DecodeError>> {
        let record = self.locate(module, instance, name)?;
        Some(self.decoder.emit(&record, sink))
    }

    /// Locates and decodes a kstat.
    ///
    /// A raw kstat without a decoder, or with a short payload, still comes
    /// back with its metadata and no statistics.
    pub fn get_kstat(&self, module: &str, instance: i32, name: &str) -> Option<Kstat> {
        let mut kstat = Kstat::new(KstatId::new(module, instance, name));
        if let Err(e) = self.read_into(module, instance, name, &mut kstat)? {
            debug!(kstat = %kstat.id(), error = %e, "kstat decoded without statistics");
        }
        Some(kstat)
    }

    /// Wall-clock time in milliseconds since the epoch.
    pub fn time_millis() -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Holder of the process-wide session.
///
/// Checking, opening and storing happen under one lock, so concurrent
/// initializations open at most one chain between them.
struct SessionSlot {
    session: OnceLock<Session>,
    opening: Mutex<()>,
}

impl SessionSlot {
    const fn new() -> Self {
        Self {
            session: OnceLock::new(),
            opening: Mutex::new(()),
        }
    }

    fn init_with<F>(&self, open: F) -> Result<&Session, SessionError>
    where
        F: FnOnce() -> Result<Session, SessionError>,
    {
        let _opening = self.opening.lock().unwrap_or_else(PoisonError::into_inner);
        if self.session.get().is_some() {
            return Err(SessionError::AlreadyInitialized);
        }
        if self.session.set(open()?).is_err() {
            return Err(SessionError::AlreadyInitialized);
        }
        self.session.get().ok_or(SessionError::AlreadyInitialized)
    }
}

/// Result of [`Session::enumerate`].
#[derive(Debug)]
pub struct Enumeration {
    generation: ChainId,
    headers: std::vec::IntoIter<KstatHeader>,
}

impl Enumeration {
    /// Chain generation the entries belong to.
    pub fn generation(&self) -> ChainId {
        self.generation
    }
}

impl Iterator for Enumeration {
    type Item = KstatHeader;

    fn next(&mut self) -> Option<KstatHeader> {
        self.headers.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.headers.size_hint()
    }
}

impl ExactSizeIterator for Enumeration {}
