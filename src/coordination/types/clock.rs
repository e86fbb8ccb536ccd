//! Time sources for lease and heartbeat bookkeeping.
//!
//! Every timestamp the protocol stores is wall-clock milliseconds. Readings are
//! assumed locally monotonic and roughly comparable across participants; no
//! skew correction is attempted.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::time::Duration;

/// A source of millisecond timestamps, injected into every component.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A thread-safe clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `start_millis`.
    pub fn new(start_millis: i64) -> Self {
        ManualClock {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(millis, AtomicOrdering::SeqCst);
    }

    /// Jumps to an absolute reading.
    pub fn set(&self, millis: i64) {
        self.now.store(millis, AtomicOrdering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(AtomicOrdering::SeqCst)
    }
}
