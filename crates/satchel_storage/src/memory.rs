//! In-memory key-value backend for testing.

use crate::backend::KeyValueBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory key-value backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral clients that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Failure injection
///
/// [`MemoryBackend::set_fail_writes`] makes every subsequent `write`
/// and `remove` return [`StorageError::WriteFailed`]. Tests use this to
/// verify that a mutation whose log entry did not persist is rejected
/// rather than silently accepted.
///
/// # Example
///
/// ```rust
/// use satchel_storage::{KeyValueBackend, MemoryBackend};
///
/// let backend = MemoryBackend::new();
/// backend.write("cursors", b"{}").unwrap();
/// assert_eq!(backend.read("cursors").unwrap(), Some(b"{}".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory backend pre-populated with entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries(entries: HashMap<String, Vec<u8>>) -> Self {
        Self {
            entries: RwLock::new(entries),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Returns a copy of all entries in the backend.
    #[must_use]
    pub fn entries(&self) -> HashMap<String, Vec<u8>> {
        self.entries.read().clone()
    }

    /// Clears all entries from the backend.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// When set, all subsequent writes and removals fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StorageError::WriteFailed("injected write failure".into()))
        } else {
            Ok(())
        }
    }
}

impl KeyValueBackend for MemoryBackend {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.into()));
        }
        self.check_writable()?;
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.check_writable()?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
