//! Tunable constants for the lease mutex and the identity coordinator.
//!
//! All values are plain milliseconds so a configuration can be shipped as a
//! small JSON document; missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoordinatorError, Result};

/// Default key of the lock record in the shared store.
pub const DEFAULT_LOCK_KEY: &str = "mutexLock";
/// Default key of the participant registry in the shared store.
pub const DEFAULT_REGISTRY_KEY: &str = "tab_ids";
/// Default name of the persisted identity in the ephemeral store.
pub const DEFAULT_IDENTITY_KEY: &str = "tab_coordinator_id";

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 300;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_INACTIVITY_THRESHOLD_MS: u64 = 10_000;

/// Configuration of one participant.
///
/// Every participant sharing a store must agree on the keys and, in practice,
/// on the timing values; nothing enforces that across participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoordinatorConfig {
    pub lock_key: String,
    pub registry_key: String,
    pub identity_key: String,
    /// A lock record older than this is considered abandoned.
    pub lock_timeout_ms: u64,
    /// Upper bound of the flat retry delay used while the lock is busy.
    pub max_retry_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Registry entries whose heartbeat is older than this are evicted.
    pub inactivity_threshold_ms: u64,
    /// When set, `release` leaves a live lock record owned by someone else
    /// in place instead of deleting it unconditionally.
    pub verify_owner_on_release: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            lock_key: DEFAULT_LOCK_KEY.to_string(),
            registry_key: DEFAULT_REGISTRY_KEY.to_string(),
            identity_key: DEFAULT_IDENTITY_KEY.to_string(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            inactivity_threshold_ms: DEFAULT_INACTIVITY_THRESHOLD_MS,
            verify_owner_on_release: false,
        }
    }
}

impl CoordinatorConfig {
    /// Parses a JSON document and validates the result.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CoordinatorConfig = serde_json::from_str(json)
            .map_err(|e| CoordinatorError::Config(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the protocol relies on.
    ///
    /// The inactivity threshold must be at least twice the heartbeat interval,
    /// otherwise live participants get evicted between two heartbeats.
    pub fn validate(&self) -> Result<()> {
        if self.lock_key.is_empty() || self.registry_key.is_empty() || self.identity_key.is_empty()
        {
            return Err(CoordinatorError::Config(
                "store keys must not be empty".to_string(),
            ));
        }
        if self.lock_key == self.registry_key {
            return Err(CoordinatorError::Config(format!(
                "lock key and registry key must differ (both are '{}')",
                self.lock_key
            )));
        }
        if self.lock_timeout_ms == 0 || self.heartbeat_interval_ms == 0 {
            return Err(CoordinatorError::Config(
                "lock timeout and heartbeat interval must be positive".to_string(),
            ));
        }
        if self.inactivity_threshold_ms < self.heartbeat_interval_ms.saturating_mul(2) {
            return Err(CoordinatorError::Config(format!(
                "inactivity threshold ({} ms) must be at least twice the heartbeat interval ({} ms)",
                self.inactivity_threshold_ms, self.heartbeat_interval_ms
            )));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn inactivity_threshold(&self) -> Duration {
        Duration::from_millis(self.inactivity_threshold_ms)
    }
}
