//! Time sources
//!
//! Asset timestamps must strictly increase across successive updates even
//! when the wall clock stalls or steps backwards, so every ledger timestamp
//! goes through a [`TimestampIssuer`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Timestamp;

/// Source of wall-clock time in milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Timestamp;
}

/// Operating system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock driven by hand, for tests and replay
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, millis: Timestamp) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Issues strictly increasing timestamps on top of a [`Clock`]
pub struct TimestampIssuer {
    clock: Arc<dyn Clock>,
    last: AtomicU64,
}

impl TimestampIssuer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: AtomicU64::new(0),
        }
    }

    /// Next timestamp: the wall clock, or one past the last issued if the
    /// clock has not moved forward
    pub fn issue(&self) -> Timestamp {
        let now = self.clock.now_millis();
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev.saturating_add(1));
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Raw wall-clock reading, not reserved
    pub fn now(&self) -> Timestamp {
        self.clock.now_millis()
    }

    /// Highest timestamp issued so far
    pub fn last_issued(&self) -> Timestamp {
        self.last.load(Ordering::SeqCst)
    }

    /// Never issue anything at or below `ts` from now on
    pub fn observe(&self, ts: Timestamp) {
        self.last.fetch_max(ts, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for TimestampIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampIssuer")
            .field("last", &self.last_issued())
            .finish()
    }
}
