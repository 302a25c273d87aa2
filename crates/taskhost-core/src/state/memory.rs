//! In-memory state store.
//!
//! A hand-written fake satisfying the [`StateStore`] contract without any
//! I/O. Tests seed it with a snapshot, optionally prime it to fail or stall
//! the load, and inspect what was registered and saved.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{Saveable, StateStore, StateStoreError, TaskSnapshot};

/// In-memory [`StateStore`] for tests and clean-start scenarios.
pub struct InMemoryStateStore {
    snapshot: TaskSnapshot,
    load_error: Option<String>,
    load_delay: Option<Duration>,
    saveable_names: Vec<String>,
    saveables: Vec<Arc<dyn Saveable>>,
    save_count: AtomicUsize,
}

impl InMemoryStateStore {
    /// Create an empty store (fresh host).
    #[must_use]
    pub fn new() -> Self {
        Self::with_snapshot(TaskSnapshot::default())
    }

    /// Create a store that loads the given snapshot.
    #[must_use]
    pub fn with_snapshot(snapshot: TaskSnapshot) -> Self {
        Self {
            snapshot,
            load_error: None,
            load_delay: None,
            saveable_names: Vec::new(),
            saveables: Vec::new(),
            save_count: AtomicUsize::new(0),
        }
    }

    /// Prime the store so `load` fails with the given reason.
    #[must_use]
    pub fn failing_load(reason: impl Into<String>) -> Self {
        let mut store = Self::new();
        store.load_error = Some(reason.into());
        store
    }

    /// Make `load` block for the given duration before completing.
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Names passed to `register_saveable`, in registration order.
    #[must_use]
    pub fn saveable_names(&self) -> &[String] {
        &self.saveable_names
    }

    /// Number of times `save` was called.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for InMemoryStateStore {
    fn register_saveable(&mut self, name: &str, saveable: Arc<dyn Saveable>) {
        self.saveable_names.push(name.to_string());
        self.saveables.push(saveable);
    }

    fn load(&mut self) -> Result<TaskSnapshot, StateStoreError> {
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }
        if let Some(reason) = &self.load_error {
            return Err(StateStoreError::Unavailable(reason.clone()));
        }
        Ok(self.snapshot.clone())
    }

    fn save(&self) -> Result<(), StateStoreError> {
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
