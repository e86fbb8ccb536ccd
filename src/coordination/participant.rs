//! Runtime wiring of a participant: startup, heartbeat timer, change
//! listener and shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{error, info};

use crate::config::CoordinatorConfig;
use crate::coordination::coordinator::{CoordinatorState, IdentityCoordinator};
use crate::coordination::types::{Clock, ParticipantId, ParticipantKey};
use crate::error::Result;
use crate::store::{EphemeralStore, SharedStore};

/// A running participant.
///
/// Dropping it aborts the background tasks without touching the registry,
/// which is exactly how a crashed or closed participant looks to the others:
/// its entry goes stale and is evicted by the next cleanup pass.
pub struct Participant<S: SharedStore, E: EphemeralStore> {
    coordinator: Arc<IdentityCoordinator<S, E>>,
    heartbeat: JoinHandle<()>,
    watcher: JoinHandle<()>,
}

impl<S: SharedStore, E: EphemeralStore> Participant<S, E> {
    /// Starts a participant.
    ///
    /// The registry listener is registered before the first claim so no
    /// change made while claiming is missed. Returns once the participant
    /// holds an id.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or when the store fails during the
    /// initial claim.
    pub async fn start(
        store: Arc<S>,
        ephemeral: Arc<E>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut subscription = store.subscribe().watch(config.registry_key.clone());
        let heartbeat_interval = config.heartbeat_interval();
        let coordinator = Arc::new(IdentityCoordinator::new(store, ephemeral, clock, config)?);

        let id = coordinator.reconcile().await?;
        info!(participant = %coordinator.key(), id, "participant active");

        let watcher = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                while let Some(event) = subscription.recv().await {
                    if let Err(e) = coordinator.on_change(&event).await {
                        error!(participant = %coordinator.key(), error = %e, "failed to reconcile registry change");
                    }
                }
            })
        };

        let heartbeat = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                let mut interval = heartbeat_timer(heartbeat_interval);
                // The first tick completes immediately; the claim just ran.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(e) = coordinator.tick().await {
                        error!(participant = %coordinator.key(), error = %e, "heartbeat failed");
                    }
                }
            })
        };

        Ok(Participant {
            coordinator,
            heartbeat,
            watcher,
        })
    }

    pub fn key(&self) -> &ParticipantKey {
        self.coordinator.key()
    }

    pub fn assigned_id(&self) -> Option<ParticipantId> {
        self.coordinator.assigned_id()
    }

    pub fn state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    pub fn coordinator(&self) -> &Arc<IdentityCoordinator<S, E>> {
        &self.coordinator
    }

    /// Stops the timers and removes this participant's registry entry.
    pub async fn stop(self) -> Result<()> {
        self.heartbeat.abort();
        self.watcher.abort();
        self.coordinator.leave().await
    }
}

/// Ticks every `period`; a stalled tick pushes the next one back instead of
/// firing a burst of catch-up heartbeats.
fn heartbeat_timer(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl<S: SharedStore, E: EphemeralStore> Drop for Participant<S, E> {
    fn drop(&mut self) {
        self.heartbeat.abort();
        self.watcher.abort();
    }
}
