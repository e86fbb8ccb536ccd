//! Error type shared by every coordination component.
//!
//! Lock contention is deliberately absent here: a busy lease is a normal
//! outcome reported as `Ok(false)`, not an error.

/// Errors surfaced by the stores, the lease mutex and the coordinator.
#[derive(thiserror::Error, Debug)]
pub enum CoordinatorError {
    /// The backing storage failed. Fatal for the current operation.
    #[error("store unavailable: {0}")]
    Store(String),
    /// The supplied configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A value could not be serialized for storage.
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
