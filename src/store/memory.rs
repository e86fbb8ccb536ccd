//! In-process shared store.
//!
//! Models a store such as browser `localStorage`: one map visible to every
//! participant, plus a notification fan-out that skips the writer. Each
//! participant works through its own [`MemoryStore::handle`].

use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::store::SharedStore;
use crate::store::subscription::{ObserverId, StoreEvent, Subscription};

const EVENT_CAPACITY: usize = 1024;

struct Shared {
    /// Lock-free reads; mutations go through `write_gate`.
    entries: SkipMap<String, String>,
    /// Serializes mutations so the `old_value` of each event is exact and
    /// events are published in write order.
    write_gate: Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
    next_observer: AtomicU64,
}

/// A handle onto an in-memory shared store.
///
/// Cloning keeps the observer id; use [`MemoryStore::handle`] to obtain a
/// view that counts as a different observer.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    observer: ObserverId,
}

impl MemoryStore {
    /// Creates an empty store and returns its first handle.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            entries: SkipMap::new(),
            write_gate: Mutex::new(()),
            events,
            next_observer: AtomicU64::new(1),
        });
        let observer = shared.next_observer.fetch_add(1, Ordering::SeqCst);
        MemoryStore { shared, observer }
    }

    /// Returns a new handle onto the same data with its own observer id.
    pub fn handle(&self) -> Self {
        MemoryStore {
            shared: Arc::clone(&self.shared),
            observer: self.shared.next_observer.fetch_add(1, Ordering::SeqCst),
        }
    }

    pub fn observer_id(&self) -> ObserverId {
        self.observer
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    fn publish(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        // No receivers is fine; nobody is watching yet.
        let _ = self.shared.events.send(StoreEvent {
            key: key.to_string(),
            old_value,
            new_value,
            origin: self.observer,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .shared
            .entries
            .get(key)
            .map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _gate = self.shared.write_gate.lock();
        let old_value = self
            .shared
            .entries
            .get(key)
            .map(|entry| entry.value().clone());
        self.shared
            .entries
            .insert(key.to_string(), value.to_string());
        self.publish(key, old_value, Some(value.to_string()));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _gate = self.shared.write_gate.lock();
        if let Some(removed) = self.shared.entries.remove(key) {
            self.publish(key, Some(removed.value().clone()), None);
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.shared.events.subscribe(), self.observer)
    }
}
