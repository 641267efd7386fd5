//! Key-value backend trait definition.

use crate::error::StorageResult;

/// A durable key-value backend for satchel.
///
/// Backends are **opaque byte stores**. They map string keys to byte
/// values and know nothing about what the bytes mean - the change log,
/// document store, outbox and cursors all serialize themselves into
/// values under well-known keys.
///
/// # Invariants
///
/// - `read` returns exactly the bytes last passed to `write` for that key
/// - `write` is durable on return: a value that was written survives
///   process termination (for persistent backends)
/// - `remove` is idempotent; removing an absent key is not an error
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - For testing and ephemeral state
/// - [`super::FileBackend`] - For persistent storage
pub trait KeyValueBackend: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns `None` if the key has never been written or was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// The write must be durable when this returns `Ok`. A failed write
    /// must leave the previous value intact - callers rely on this to
    /// keep the change log and document store paired.
    ///
    /// # Errors
    ///
    /// Returns an error if the value could not be durably stored.
    fn write(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be modified.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Returns all keys currently present, in unspecified order.
    ///
    /// Intended for diagnostics and tests, not hot paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be enumerated.
    fn keys(&self) -> StorageResult<Vec<String>>;
}
