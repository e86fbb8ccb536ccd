//! Type definitions for the coordination protocol.
//!
//! This module contains the identifiers and the time source shared by the
//! lease mutex, the registry and the identity coordinator.

pub mod clock;
pub mod participant;
pub mod participant_key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use participant::ParticipantId;
pub use participant_key::ParticipantKey;
