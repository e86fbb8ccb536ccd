//! Timeout-based advisory mutex over a shared key/value store.
//!
//! The lock is an ordinary value, `"<acquiredAtMillis>|<ownerToken>"`, stored
//! under one key. A record older than the lock timeout is treated as abandoned
//! and may be overwritten by anyone, which is how the lock heals after its
//! holder disappears without releasing it.
//!
//! # Caveats
//!
//! The store offers no compare-and-swap, so two participants that read "free"
//! at the same moment can both write and both believe they hold the lock. The
//! randomized retry delay makes this unlikely; critical sections must stay
//! short relative to the lock timeout.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CoordinatorConfig;
use crate::coordination::types::Clock;
use crate::error::Result;
use crate::store::SharedStore;

/// Retry delays are never shorter than this, so a zero draw cannot spin.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// The value stored under the lock key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Wall-clock milliseconds at which the lock was written.
    pub acquired_at: i64,
    /// Token of the participant that wrote it.
    pub owner: String,
}

impl LockRecord {
    pub fn new(acquired_at: i64, owner: impl Into<String>) -> Self {
        LockRecord {
            acquired_at,
            owner: owner.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}|{}", self.acquired_at, self.owner)
    }

    /// Parses a stored record. Returns `None` for anything malformed.
    pub fn decode(raw: &str) -> Option<Self> {
        let (acquired_at, owner) = raw.split_once('|')?;
        let acquired_at = acquired_at.trim().parse().ok()?;
        Some(LockRecord::new(acquired_at, owner))
    }

    /// A record is valid while `now - acquired_at < timeout`.
    pub fn is_expired(&self, now: i64, timeout: Duration) -> bool {
        let timeout = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(self.acquired_at) >= timeout
    }
}

/// Advisory mutual exclusion shared by every participant of one store.
///
/// The owner token identifies a participant, not a single acquisition: a
/// participant that finds its own record treats the lock as already held.
/// That makes concurrent calls from the *same* owner unsafe against each
/// other; callers serialize their own critical sections.
pub struct LeaseMutex<S: SharedStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    owner: String,
    lock_key: String,
    lock_timeout: Duration,
    max_retry_delay: Duration,
    verify_owner_on_release: bool,
}

impl<S: SharedStore> LeaseMutex<S> {
    /// Creates a mutex for `owner` using the lock settings in `config`.
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        owner: impl Into<String>,
        config: &CoordinatorConfig,
    ) -> Self {
        LeaseMutex {
            store,
            clock,
            owner: owner.into(),
            lock_key: config.lock_key.clone(),
            lock_timeout: config.lock_timeout(),
            max_retry_delay: config.max_retry_delay(),
            verify_owner_on_release: config.verify_owner_on_release,
        }
    }

    /// Reads the current lock record, if a well-formed one exists.
    pub fn current(&self) -> Result<Option<LockRecord>> {
        Ok(self
            .store
            .get(&self.lock_key)?
            .and_then(|raw| LockRecord::decode(&raw)))
    }

    /// Tries to take the lock without waiting.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - the caller now holds the lock (or already did)
    /// * `Ok(false)` - another owner holds a lock that has not timed out
    /// * `Err(_)` - the store failed
    pub fn acquire(&self) -> Result<bool> {
        let now = self.clock.now_millis();

        if let Some(raw) = self.store.get(&self.lock_key)? {
            match LockRecord::decode(&raw) {
                Some(record) if record.owner == self.owner => return Ok(true),
                Some(record) if !record.is_expired(now, self.lock_timeout) => return Ok(false),
                Some(record) => {
                    debug!(
                        owner = %self.owner,
                        stale_owner = %record.owner,
                        age_ms = now - record.acquired_at,
                        "superseding timed-out lock"
                    );
                }
                None => {
                    warn!(owner = %self.owner, value = %raw, "overwriting malformed lock record");
                }
            }
        }

        self.store
            .set(&self.lock_key, &LockRecord::new(now, self.owner.as_str()).encode())?;
        Ok(true)
    }

    /// Releases the lock. Idempotent.
    ///
    /// By default the record is deleted without checking who owns it, so a
    /// holder whose lease already timed out can delete its successor's lock.
    /// With `verify_owner_on_release` a live record owned by someone else is
    /// left in place.
    pub fn release(&self) -> Result<()> {
        if self.verify_owner_on_release {
            if let Some(record) = self.current()? {
                let now = self.clock.now_millis();
                if record.owner != self.owner && !record.is_expired(now, self.lock_timeout) {
                    debug!(
                        owner = %self.owner,
                        holder = %record.owner,
                        "lock now held by another owner, not releasing"
                    );
                    return Ok(());
                }
            }
        }
        self.store.delete(&self.lock_key)
    }

    /// Runs `action` while holding the lock, retrying until it is acquired.
    ///
    /// A retry delay is drawn once, uniformly from `[0, max_retry_delay]`, and
    /// reused for every attempt of this call. There is no attempt limit; wrap
    /// the future in a timeout for a bounded wait. Dropping the future cancels
    /// the retry.
    ///
    /// The lock is released whether or not `action` succeeds; the action's
    /// error is returned afterwards.
    pub async fn run_exclusive<F, R>(&self, action: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let delay = self.retry_delay();
        let mut attempts: u32 = 0;

        loop {
            if self.acquire()? {
                let outcome = action();
                self.release()?;
                return outcome;
            }

            attempts += 1;
            debug!(owner = %self.owner, attempts, delay_ms = delay.as_millis() as u64, "retrying to acquire lock");
            tokio::time::sleep(delay).await;
        }
    }

    fn retry_delay(&self) -> Duration {
        let max = self.max_retry_delay.as_millis() as u64;
        let drawn = Duration::from_millis(rand::rng().random_range(0..=max));
        drawn.max(MIN_RETRY_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::types::ManualClock;
    use crate::store::MemoryStore;

    const NOW: i64 = 1_000_000_000_000;

    fn mutex(store: &MemoryStore, clock: &Arc<ManualClock>, owner: &str) -> LeaseMutex<MemoryStore> {
        LeaseMutex::new(
            Arc::new(store.handle()),
            clock.clone(),
            owner,
            &CoordinatorConfig::default(),
        )
    }

    #[test]
    fn test_lock_record_codec() {
        let record = LockRecord::new(NOW, "abc");
        assert_eq!(record.encode(), "1000000000000|abc");
        assert_eq!(LockRecord::decode("1000000000000|abc"), Some(record));
        assert_eq!(LockRecord::decode("garbage"), None);
        assert_eq!(LockRecord::decode("soon|abc"), None);
    }

    #[test]
    fn test_lock_record_expiry_boundary() {
        let record = LockRecord::new(NOW, "abc");
        let timeout = Duration::from_millis(100);
        assert!(!record.is_expired(NOW + 99, timeout));
        assert!(record.is_expired(NOW + 100, timeout));
        assert!(record.is_expired(NOW + 101, timeout));
    }

    #[test]
    fn test_acquire_free_lock() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let a = mutex(&store, &clock, "a");

        assert!(a.acquire().unwrap());
        assert_eq!(a.current().unwrap(), Some(LockRecord::new(NOW, "a")));
    }

    #[test]
    fn test_same_owner_reacquires() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let a = mutex(&store, &clock, "a");

        assert!(a.acquire().unwrap());
        clock.advance(Duration::from_millis(10));
        assert!(a.acquire().unwrap());
        // Re-entry does not refresh the timestamp.
        assert_eq!(a.current().unwrap().unwrap().acquired_at, NOW);
    }

    #[test]
    fn test_foreign_live_lock_blocks() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let a = mutex(&store, &clock, "a");
        let b = mutex(&store, &clock, "b");

        assert!(a.acquire().unwrap());
        clock.advance(Duration::from_millis(99));
        assert!(!b.acquire().unwrap());
        assert_eq!(b.current().unwrap().unwrap().owner, "a");
    }

    #[test]
    fn test_timed_out_lock_is_superseded() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let a = mutex(&store, &clock, "a");
        let b = mutex(&store, &clock, "b");

        assert!(a.acquire().unwrap());
        clock.advance(Duration::from_millis(101));
        assert!(b.acquire().unwrap());
        assert_eq!(b.current().unwrap(), Some(LockRecord::new(NOW + 101, "b")));
    }

    #[test]
    fn test_malformed_lock_is_overwritten() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        store.set("mutexLock", "not a lock").unwrap();

        let a = mutex(&store, &clock, "a");
        assert!(a.acquire().unwrap());
        assert_eq!(a.current().unwrap().unwrap().owner, "a");
    }

    #[test]
    fn test_release_is_idempotent() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let a = mutex(&store, &clock, "a");

        a.release().unwrap();
        assert!(a.acquire().unwrap());
        a.release().unwrap();
        a.release().unwrap();
        assert_eq!(store.get("mutexLock").unwrap(), None);
    }

    #[test]
    fn test_release_deletes_foreign_lock_by_default() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let a = mutex(&store, &clock, "a");
        let b = mutex(&store, &clock, "b");

        assert!(b.acquire().unwrap());
        a.release().unwrap();
        assert_eq!(store.get("mutexLock").unwrap(), None);
    }

    #[test]
    fn test_verified_release_keeps_foreign_lock() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let config = CoordinatorConfig {
            verify_owner_on_release: true,
            ..Default::default()
        };
        let a = LeaseMutex::new(Arc::new(store.handle()), clock.clone(), "a", &config);
        let b = mutex(&store, &clock, "b");

        assert!(b.acquire().unwrap());
        a.release().unwrap();
        assert_eq!(a.current().unwrap().unwrap().owner, "b");

        // Once the foreign lock times out it may be cleared.
        clock.advance(Duration::from_millis(100));
        a.release().unwrap();
        assert_eq!(store.get("mutexLock").unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_exclusive_releases_after_action() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let a = mutex(&store, &clock, "a");

        let value = a
            .run_exclusive(|| {
                assert_eq!(store.get("mutexLock").unwrap().as_deref(), Some("1000000000000|a"));
                Ok(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(store.get("mutexLock").unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_exclusive_releases_on_error() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let a = mutex(&store, &clock, "a");

        let result: Result<()> = a
            .run_exclusive(|| Err(crate::error::CoordinatorError::Store("boom".to_string())))
            .await;
        assert!(result.is_err());
        assert_eq!(store.get("mutexLock").unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_exclusive_waits_for_release() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let a = mutex(&store, &clock, "a");
        let b = mutex(&store, &clock, "b");

        assert!(a.acquire().unwrap());
        let waiter = tokio::spawn(async move { b.run_exclusive(|| Ok("b ran")).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        a.release().unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, "b ran");
    }
}
