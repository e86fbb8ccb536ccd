//! The shared participant registry.
//!
//! The registry is a single JSON document in the shared store mapping each
//! live participant's key to its last heartbeat and assigned id:
//!
//! ```json
//! {"l0x2k9a1f3": {"lastUpdate": 1700000000000, "tabId": 1}}
//! ```
//!
//! [`RegistryStore`] only reads and overwrites the whole document. Callers
//! perform read-modify-write cycles under the lease mutex.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::coordination::types::ParticipantId;
use crate::error::Result;
use crate::store::SharedStore;

/// Liveness and identity record of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Wall-clock milliseconds of the owner's last heartbeat.
    #[serde(rename = "lastUpdate", alias = "lastHeartbeat")]
    pub last_heartbeat: i64,
    #[serde(rename = "tabId", alias = "assignedId")]
    pub assigned_id: ParticipantId,
}

impl RegistryEntry {
    pub fn new(last_heartbeat: i64, assigned_id: ParticipantId) -> Self {
        RegistryEntry {
            last_heartbeat,
            assigned_id,
        }
    }

    /// Stale means strictly older than the threshold; an entry exactly at the
    /// threshold is still live.
    pub fn is_stale(&self, now: i64, inactivity_threshold: Duration) -> bool {
        let threshold = i64::try_from(inactivity_threshold.as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(self.last_heartbeat) > threshold
    }
}

/// Participant key to registry entry, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry(BTreeMap<String, RegistryEntry>);

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&RegistryEntry> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: RegistryEntry) -> Option<RegistryEntry> {
        self.0.insert(key.into(), entry)
    }

    pub fn remove(&mut self, key: &str) -> Option<RegistryEntry> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RegistryEntry)> {
        self.0.iter()
    }

    /// Returns the smallest positive id not assigned to any entry: the first
    /// gap in the used set, or one past the maximum when there is none.
    pub fn lowest_available_id(&self) -> ParticipantId {
        let used: HashSet<ParticipantId> = self.0.values().map(|e| e.assigned_id).collect();
        let mut candidate: ParticipantId = 1;
        while used.contains(&candidate) {
            candidate += 1;
        }
        candidate
    }

    /// Removes every stale entry and returns the removed keys.
    pub fn remove_stale(&mut self, now: i64, inactivity_threshold: Duration) -> Vec<String> {
        let stale: Vec<String> = self
            .0
            .iter()
            .filter(|(_, entry)| entry.is_stale(now, inactivity_threshold))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.0.remove(key);
        }
        stale
    }

    /// Whether two views differ in a way that warrants reconciliation.
    ///
    /// They differ when the entry counts differ, or when a key present in both
    /// maps to different ids. Heartbeat timestamps are ignored, and a key that
    /// appears on one side only does not count by itself.
    pub fn is_different(&self, other: &Registry) -> bool {
        if self.len() != other.len() {
            return true;
        }
        self.0.iter().any(|(key, entry)| {
            other
                .get(key)
                .is_some_and(|theirs| theirs.assigned_id != entry.assigned_id)
        })
    }

    /// Decodes a stored registry document.
    ///
    /// An absent value is an empty registry. A malformed one is logged and
    /// also treated as empty, so a corrupt document heals on the next write.
    pub fn decode(raw: Option<&str>) -> Registry {
        let Some(raw) = raw else {
            return Registry::new();
        };
        match serde_json::from_str(raw) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(error = %e, "malformed registry, treating as empty");
                Registry::new()
            }
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl FromIterator<(String, RegistryEntry)> for Registry {
    fn from_iter<I: IntoIterator<Item = (String, RegistryEntry)>>(iter: I) -> Self {
        Registry(iter.into_iter().collect())
    }
}

/// Reads and writes the registry document in a shared store.
pub struct RegistryStore<S: SharedStore> {
    store: Arc<S>,
    key: String,
}

impl<S: SharedStore> RegistryStore<S> {
    pub fn new(store: Arc<S>, key: impl Into<String>) -> Self {
        RegistryStore {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the registry. Store failures propagate; bad contents do not.
    pub fn read(&self) -> Result<Registry> {
        let raw = self.store.get(&self.key)?;
        Ok(Registry::decode(raw.as_deref()))
    }

    /// Overwrites the registry.
    pub fn write(&self, registry: &Registry) -> Result<()> {
        self.store.set(&self.key, &registry.encode()?)
    }
}
