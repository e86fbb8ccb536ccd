//! # Tab Coordinator - identity coordination over a shared key/value store
//!
//! Lets independent participants (browser tabs, worker processes) that share
//! nothing but a key/value store, its change notifications and a private
//! per-process store agree on exclusive access and on a unique small-integer
//! id each, while participants appear and disappear without notice.
//!
//! ## Features
//!
//! - **Lease mutex**: a timestamped lock record that heals itself once its
//!   holder has been gone for longer than the lock timeout
//! - **Lowest-available ids**: new participants fill gaps before extending
//! - **Heartbeats and eviction**: silent participants are removed from the
//!   registry by whoever notices first
//! - **Reload recovery**: a re-created coordinator in the same process keeps
//!   its id
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tab_coordinator::{
//!     CoordinatorConfig, MemoryEphemeralStore, MemoryStore, Participant, SystemClock,
//! };
//!
//! # async fn run() -> tab_coordinator::Result<()> {
//! let store = MemoryStore::new();
//! let participant = Participant::start(
//!     Arc::new(store.handle()),
//!     Arc::new(MemoryEphemeralStore::new()),
//!     Arc::new(SystemClock),
//!     CoordinatorConfig::default(),
//! )
//! .await?;
//! println!("assigned id: {:?}", participant.assigned_id());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordination;
pub mod error;
pub mod server;
pub mod store;

// Re-export the main public API
pub use config::CoordinatorConfig;
pub use coordination::{
    Clock, CoordinatorState, IdentityCoordinator, LeaseMutex, LockRecord, ManualClock,
    Participant, ParticipantId, ParticipantKey, Registry, RegistryEntry, RegistryStore,
    SystemClock,
};
pub use error::{CoordinatorError, Result};
pub use store::{
    EphemeralStore, MemoryEphemeralStore, MemoryStore, SharedStore, StoreEvent, Subscription,
};
