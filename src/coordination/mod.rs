//! Coordination protocol: lease mutex, participant registry and identity
//! coordinator.
//!
//! This module contains the protocol that lets independent participants
//! sharing one key/value store agree on exclusive access and on a unique
//! small-integer id each.

pub mod coordinator;
pub mod lease;
pub mod participant;
pub mod registry;
pub mod types;

// Re-export the main public API
pub use coordinator::{CoordinatorState, IdentityCoordinator};
pub use lease::{LeaseMutex, LockRecord};
pub use participant::Participant;
pub use registry::{Registry, RegistryEntry, RegistryStore};
pub use types::{Clock, ManualClock, ParticipantId, ParticipantKey, SystemClock};
