//! Change notifications emitted by a shared store.

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Identifies one handle onto a shared store. Events carry the id of the
/// handle that caused them so the writer can be excluded from delivery.
pub type ObserverId = u64;

/// "Key K changed from old to new", as seen by other observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    #[serde(skip)]
    pub origin: ObserverId,
}

/// A stream of [`StoreEvent`]s for one observer.
pub struct Subscription {
    receiver: broadcast::Receiver<StoreEvent>,
    observer: ObserverId,
    key: Option<String>,
}

impl Subscription {
    pub fn new(receiver: broadcast::Receiver<StoreEvent>, observer: ObserverId) -> Self {
        Subscription {
            receiver,
            observer,
            key: None,
        }
    }

    /// Restricts delivery to events for `key`.
    pub fn watch(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Waits for the next event caused by another observer.
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if event.origin == self.observer {
                        continue;
                    }
                    if self.key.as_deref().is_some_and(|key| key != event.key) {
                        continue;
                    }
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(observer = self.observer, skipped, "store subscription lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
