//! Error types for the local stores.

use crate::changelog::Operation;
use satchel_storage::StorageError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or mutating local state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The durable backend failed.
    ///
    /// On the write path this must propagate to the original caller of
    /// the mutation - a mutation whose log entry did not persist was
    /// never accepted.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A persisted record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A create or update was recorded without a document body.
    #[error("{operation} change requires a payload")]
    MissingPayload {
        /// The operation that was attempted.
        operation: Operation,
    },
}
