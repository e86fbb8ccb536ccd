//! Identity coordination for one participant.
//!
//! The coordinator keeps this participant's entry in the shared registry
//! alive and owns its small-integer id. All registry mutations happen inside
//! an exclusive section of the lease mutex; within the participant a local
//! gate additionally serializes those sections, because the lease treats
//! concurrent acquisitions by the same owner as re-entry.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::coordination::lease::LeaseMutex;
use crate::coordination::registry::{Registry, RegistryEntry, RegistryStore};
use crate::coordination::types::{Clock, ParticipantId, ParticipantKey};
use crate::error::Result;
use crate::store::{EphemeralStore, SharedStore, StoreEvent};

/// Lifecycle of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorState {
    /// Created, no id confirmed in the registry yet.
    Starting,
    /// Holds a registry entry that its heartbeat keeps fresh.
    Active,
    /// Left the registry; no further heartbeats.
    Stopped,
}

#[derive(Debug)]
struct LocalIdentity {
    assigned_id: Option<ParticipantId>,
    state: CoordinatorState,
}

/// Claims, refreshes and reconciles one participant's registry entry.
pub struct IdentityCoordinator<S: SharedStore, E: EphemeralStore> {
    key: ParticipantKey,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    registry: RegistryStore<S>,
    mutex: LeaseMutex<S>,
    ephemeral: Arc<E>,
    local: Mutex<LocalIdentity>,
    /// The registry as this participant last wrote or observed it.
    last_view: Mutex<Registry>,
    gate: AsyncMutex<()>,
}

impl<S: SharedStore, E: EphemeralStore> IdentityCoordinator<S, E> {
    /// Creates a coordinator with a fresh participant key.
    ///
    /// An id persisted by an earlier coordinator of the same process is
    /// recovered from the ephemeral store and will be reused by [`claim`].
    ///
    /// [`claim`]: IdentityCoordinator::claim
    pub fn new(
        store: Arc<S>,
        ephemeral: Arc<E>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        let key = ParticipantKey::generate();
        let recovered = recover_identity(ephemeral.as_ref(), &config.identity_key)?;
        if let Some(id) = recovered {
            debug!(participant = %key, id, "recovered persisted id");
        }

        Ok(IdentityCoordinator {
            registry: RegistryStore::new(Arc::clone(&store), config.registry_key.clone()),
            mutex: LeaseMutex::new(store, Arc::clone(&clock), key.as_str(), &config),
            key,
            config,
            clock,
            ephemeral,
            local: Mutex::new(LocalIdentity {
                assigned_id: recovered,
                state: CoordinatorState::Starting,
            }),
            last_view: Mutex::new(Registry::new()),
            gate: AsyncMutex::new(()),
        })
    }

    pub fn key(&self) -> &ParticipantKey {
        &self.key
    }

    pub fn assigned_id(&self) -> Option<ParticipantId> {
        self.local.lock().assigned_id
    }

    pub fn state(&self) -> CoordinatorState {
        self.local.lock().state
    }

    /// The registry as last written or observed by this participant.
    pub fn last_view(&self) -> Registry {
        self.last_view.lock().clone()
    }

    /// Removes stale entries from the registry.
    ///
    /// The registry is written back even when nothing was removed. Must run
    /// inside an exclusive section.
    pub fn cleanup(&self) -> Result<Vec<String>> {
        let mut registry = self.registry.read()?;
        let removed = registry.remove_stale(
            self.clock.now_millis(),
            self.config.inactivity_threshold(),
        );
        if !removed.is_empty() {
            info!(participant = %self.key, ?removed, "evicted stale participants");
        }
        self.commit(&registry)?;
        Ok(removed)
    }

    /// Writes this participant's entry, keeping its current id or allocating
    /// the lowest available one. Must run inside an exclusive section.
    ///
    /// A newly allocated id is persisted to the ephemeral store so a
    /// re-created coordinator in the same process keeps it.
    pub fn claim(&self) -> Result<ParticipantId> {
        let mut registry = self.registry.read()?;
        let remembered = self.local.lock().assigned_id;

        let id = match remembered {
            Some(id) => id,
            None => {
                let id = registry.lowest_available_id();
                self.adopt(id)?;
                info!(participant = %self.key, id, "claimed id");
                id
            }
        };

        registry.insert(
            self.key.as_str(),
            RegistryEntry::new(self.clock.now_millis(), id),
        );
        self.commit(&registry)?;
        self.local.lock().state = CoordinatorState::Active;
        Ok(id)
    }

    /// Refreshes this participant's heartbeat. Must run inside an exclusive
    /// section.
    ///
    /// If the entry is gone, because a cleanup pass evicted it after a missed
    /// heartbeat, the participant silently re-claims, possibly under a new id.
    pub fn heartbeat(&self) -> Result<ParticipantId> {
        let mut registry = self.registry.read()?;

        let id = match registry.get(self.key.as_str()) {
            Some(entry) => entry.assigned_id,
            None => {
                let id = registry.lowest_available_id();
                warn!(
                    participant = %self.key,
                    previous = ?self.assigned_id(),
                    id,
                    "registry entry was evicted, re-claiming"
                );
                id
            }
        };
        if self.assigned_id() != Some(id) {
            self.adopt(id)?;
        }

        registry.insert(
            self.key.as_str(),
            RegistryEntry::new(self.clock.now_millis(), id),
        );
        self.commit(&registry)?;
        Ok(id)
    }

    /// Runs `{cleanup; claim}` exclusively. Used at startup and whenever an
    /// external change is significant.
    pub async fn reconcile(&self) -> Result<ParticipantId> {
        self.exclusive(|| {
            self.cleanup()?;
            self.claim()
        })
        .await
    }

    /// Runs `{cleanup; heartbeat}` exclusively. Called on every heartbeat
    /// interval.
    pub async fn tick(&self) -> Result<ParticipantId> {
        self.exclusive(|| {
            self.cleanup()?;
            self.heartbeat()
        })
        .await
    }

    /// Reacts to a registry change made by another participant.
    ///
    /// The new value is compared with the last known view; only a
    /// significant difference (entry count or an id of a shared key) triggers
    /// a reconcile. Returns whether a reconcile ran.
    pub async fn on_change(&self, event: &StoreEvent) -> Result<bool> {
        if event.key != self.registry.key() {
            return Ok(false);
        }
        if self.state() == CoordinatorState::Stopped {
            return Ok(false);
        }

        let incoming = Registry::decode(event.new_value.as_deref());
        let entries = incoming.len();
        {
            // Our own commits update the view under the gate too.
            let _gate = self.gate.lock().await;
            let different = incoming.is_different(&self.last_view.lock());
            if !different {
                *self.last_view.lock() = incoming;
                return Ok(false);
            }
        }

        debug!(
            participant = %self.key,
            entries,
            "registry changed externally, reconciling"
        );
        self.reconcile().await?;
        Ok(true)
    }

    /// Removes this participant's entry from the registry and stops
    /// reacting to changes. The persisted id is kept for a later coordinator
    /// of the same process.
    pub async fn leave(&self) -> Result<()> {
        self.exclusive(|| {
            let mut registry = self.registry.read()?;
            if registry.remove(self.key.as_str()).is_some() {
                self.commit(&registry)?;
            }
            Ok(())
        })
        .await?;
        self.local.lock().state = CoordinatorState::Stopped;
        info!(participant = %self.key, "left registry");
        Ok(())
    }

    /// Runs `action` holding both the local gate and the lease.
    async fn exclusive<F, R>(&self, action: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let _gate = self.gate.lock().await;
        self.mutex.run_exclusive(action).await
    }

    fn commit(&self, registry: &Registry) -> Result<()> {
        self.registry.write(registry)?;
        *self.last_view.lock() = registry.clone();
        Ok(())
    }

    fn adopt(&self, id: ParticipantId) -> Result<()> {
        self.ephemeral
            .set(&self.config.identity_key, &id.to_string())?;
        self.local.lock().assigned_id = Some(id);
        Ok(())
    }
}

/// Reads the id persisted by an earlier coordinator of this process.
fn recover_identity<E: EphemeralStore>(
    ephemeral: &E,
    identity_key: &str,
) -> Result<Option<ParticipantId>> {
    let Some(raw) = ephemeral.get(identity_key)? else {
        return Ok(None);
    };
    match raw.trim().parse::<ParticipantId>() {
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => {
            warn!(value = %raw, "ignoring malformed persisted id");
            Ok(None)
        }
    }
}
