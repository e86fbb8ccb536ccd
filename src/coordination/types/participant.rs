//! Participant identifier type.
//!
//! This module contains the definition of ParticipantId, the small positive
//! integer each live participant is assigned by the coordinator.

/// The small-integer identity handed out to each live participant.
///
/// Identifiers start at 1 and are reused: a new participant receives the
/// lowest value not held by any live registry entry.
pub type ParticipantId = u32;
