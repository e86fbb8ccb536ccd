//! Per-process storage that survives re-initialization but not a restart.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// Private, process-scoped storage (the `sessionStorage` of a tab).
///
/// Only the owning process reads or writes it, so no locking protocol is
/// involved.
pub trait EphemeralStore: Send + Sync + 'static {
    fn get(&self, name: &str) -> Result<Option<String>>;
    fn set(&self, name: &str, value: &str) -> Result<()>;
}

/// Heap-backed ephemeral store. Clones share the same data, which is how a
/// re-created coordinator inside the same process sees earlier values.
#[derive(Clone, Default)]
pub struct MemoryEphemeralStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EphemeralStore for MemoryEphemeralStore {
    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(name).cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}
