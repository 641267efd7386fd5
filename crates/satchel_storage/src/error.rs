//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key is empty or otherwise unusable.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// A durable write was rejected.
    ///
    /// Callers must treat this as a hard failure of the enclosing
    /// mutation: data that did not reach the backend does not exist.
    #[error("write failed: {0}")]
    WriteFailed(String),
}
