//! # Satchel Store
//!
//! Persistent local state for the satchel sync engine.
//!
//! This crate provides everything the client keeps on device:
//! - [`DocumentStore`] - per-collection materialized cache (read path)
//! - [`ChangeLog`] - append-only ledger of pending local mutations
//! - [`CursorStore`] - per-collection pull watermarks
//! - [`OutboxStore`] - durable FIFO of deferred outbound requests
//! - [`ConflictStore`] - review list for manual conflict resolution
//! - [`LocalStore`] - facade tying them together over one backend
//!
//! ## Key Invariants
//!
//! - Application writes go log-then-apply: the change log entry is
//!   durable before the document store changes, never the other way
//!   around
//! - A storage failure on the log append propagates to the caller; the
//!   mutation was never accepted
//! - The change log is append + retroactive-flag only; pruning removes
//!   synced entries past a retention window and nothing else
//! - Cursors advance monotonically
//!
//! All state is stored as JSON values under well-known keys in a
//! [`satchel_storage::KeyValueBackend`], with in-memory images serving
//! reads so the application read path stays synchronous and available
//! during a sync cycle.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changelog;
mod conflicts;
mod cursor;
mod document;
mod error;
mod local;
mod outbox;
mod request;

pub use changelog::{ChangeEntry, ChangeLog, Operation};
pub use conflicts::{ConflictStore, PendingConflict};
pub use cursor::CursorStore;
pub use document::{DocumentStore, LocalDocument};
pub use error::{StoreError, StoreResult};
pub use local::LocalStore;
pub use outbox::{OutboxStore, QueuedRequest};
pub use request::{Method, OutboundRequest};

/// Milliseconds since the Unix epoch, from the system clock.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
