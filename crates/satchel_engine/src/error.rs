//! Error types for the sync engine.

use crate::remote::RemoteError;
use satchel_store::StoreError;
use thiserror::Error;

/// Errors produced while coordinating a sync cycle or replaying the
/// offline outbox.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The remote rejected or failed a request.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The remote answered with something we could not interpret.
    #[error("malformed remote response: {0}")]
    Protocol(String),

    /// A create or update change entry carried no payload to send.
    #[error("change entry for {collection}/{document_id} has no payload")]
    MissingPayload {
        /// Collection of the broken entry.
        collection: String,
        /// Document id of the broken entry.
        document_id: String,
    },

    /// A sync cycle was requested while another one is running.
    #[error("sync already in progress")]
    SyncInProgress,

    /// No network connection is available.
    #[error("no network connection")]
    NoConnectivity,
}

/// Result alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;
