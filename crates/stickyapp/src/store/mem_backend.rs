use super::backend::StorageBackend;
use crate::error::{Result, StickyError, WriteFailure};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    values: HashMap<String, Vec<u8>>,
    writes: HashMap<String, usize>,
    simulate_write_error: Option<WriteFailure>,
    failing_keys: HashMap<String, WriteFailure>,
    simulate_read_error: bool,
}

/// In-memory storage backend for tests and ephemeral stores.
///
/// Uses a `Mutex` rather than `RefCell` because the auto-save scheduler may
/// run on another runtime thread. Wrap it in an `Arc` to keep a handle for
/// inspection after handing it to a store.
#[derive(Default)]
pub struct MemBackend {
    inner: Mutex<Inner>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every write fail with the given classification (`None` heals).
    pub fn set_simulate_write_error(&self, failure: Option<WriteFailure>) {
        self.inner().simulate_write_error = failure;
    }

    /// Make writes to one key fail, leaving every other key writable.
    pub fn set_simulate_write_error_for(&self, key: &str, failure: Option<WriteFailure>) {
        let mut inner = self.inner();
        match failure {
            Some(failure) => inner.failing_keys.insert(key.to_string(), failure),
            None => inner.failing_keys.remove(key),
        };
    }

    /// Make every read fail as if the medium were unreadable.
    pub fn set_simulate_read_error(&self, simulate: bool) {
        self.inner().simulate_read_error = simulate;
    }

    /// Store bytes without counting it as a write (seeding fixtures, corrupting data).
    pub fn put_raw(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.inner().values.insert(key.to_string(), bytes.into());
    }

    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner().values.get(key).cloned()
    }

    /// Number of successful writes to `key`.
    pub fn write_count(&self, key: &str) -> usize {
        self.inner().writes.get(key).copied().unwrap_or(0)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner().values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl StorageBackend for MemBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.inner();
        if inner.simulate_read_error {
            return Err(StickyError::Read {
                key: key.to_string(),
                message: "Simulated read error".to_string(),
            });
        }
        Ok(inner.values.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner();
        let failure = inner
            .simulate_write_error
            .or_else(|| inner.failing_keys.get(key).copied());
        if let Some(failure) = failure {
            return Err(StickyError::Write {
                key: key.to_string(),
                failure,
                message: "Simulated write error".to_string(),
            });
        }
        inner.values.insert(key.to_string(), bytes.to_vec());
        *inner.writes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner().values.remove(key);
        Ok(())
    }
}
