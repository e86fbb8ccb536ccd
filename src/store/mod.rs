//! Storage collaborators the coordination protocol is built on.
//!
//! The protocol needs three things from its environment: a shared key/value
//! store with single-key atomic operations, a change notification that reaches
//! every observer except the writer, and a per-process ephemeral store. This
//! module defines those seams as traits and ships in-memory implementations
//! used by the demo server and the tests.

pub mod ephemeral;
pub mod memory;
pub mod subscription;

use crate::error::Result;

pub use ephemeral::{EphemeralStore, MemoryEphemeralStore};
pub use memory::MemoryStore;
pub use subscription::{ObserverId, StoreEvent, Subscription};

/// A key/value store shared by every participant.
///
/// Single-key operations are atomic; there is no read-modify-write primitive,
/// so callers serialize updates through the lease mutex.
pub trait SharedStore: Send + Sync + 'static {
    /// Reads the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrites the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Subscribes to mutations made through any *other* handle of this store.
    fn subscribe(&self) -> Subscription;
}
