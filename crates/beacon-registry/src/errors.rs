//! Pending-error tracker.
//!
//! Verification and probing happen after the announce was already
//! answered, so their failures cannot reach that response. They are filed
//! here instead, keyed by (announcing IP, claimed address, port), and the
//! next announce for the same key replays them exactly once.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::clock::SharedClock;

/// How long a filed error stays replayable.
pub const ERROR_VALIDITY: Duration = Duration::from_secs(600);

/// Key: some failures depend on the announcing IP too, not just the
/// claimed endpoint.
pub type ErrorKey = (IpAddr, String, u16);

/// A failure waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingError {
    /// true = the request itself went through, this is advisory.
    pub warning: bool,
    pub message: String,
}

impl PendingError {
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            warning: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            warning: false,
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub struct PendingErrorTracker {
    table: Arc<DashMap<ErrorKey, (u64, PendingError)>>,
    clock: SharedClock,
}

impl PendingErrorTracker {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            clock,
        }
    }

    pub fn put(&self, key: ErrorKey, error: PendingError) {
        let valid_until = self.clock.now_unix() + ERROR_VALIDITY.as_secs();
        self.table.insert(key, (valid_until, error));
    }

    /// Look up without consuming. The worker removes the entry when it
    /// starts reprocessing the same key, which is what makes the replay
    /// happen exactly once.
    pub fn get(&self, key: &ErrorKey) -> Option<PendingError> {
        let entry = self.table.get(key)?;
        let (valid_until, error) = entry.value();
        if *valid_until >= self.clock.now_unix() {
            Some(error.clone())
        } else {
            None
        }
    }

    pub fn remove(&self, key: &ErrorKey) {
        self.table.remove(key);
    }

    /// Drop expired entries. Called from the sweeper.
    pub fn cleanup(&self) {
        let now = self.clock.now_unix();
        self.table.retain(|_, (valid_until, _)| *valid_until >= now);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
