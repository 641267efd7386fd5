//! # Satchel Engine
//!
//! Offline-first synchronization between a [`satchel_store::LocalStore`]
//! and a remote data interface.
//!
//! The engine drives a push-then-pull cycle:
//! 1. Replay unsynced change log entries to the remote, in order
//! 2. Resolve any push conflicts per the configured
//!    [`ConflictStrategy`]
//! 3. Pull per-collection deltas since the last cursor and apply them
//! 4. Advance cursors and prune the change log
//!
//! Cycles run on demand via [`SyncEngine::sync`], or in the background
//! via [`SyncEngine::start`], which also syncs immediately when
//! connectivity returns. The [`OfflineQueue`] handles ad-hoc requests
//! the same way: send when online, persist and replay when not.
//!
//! The remote and the connectivity signal are traits
//! ([`RemoteClient`], [`ConnectivityMonitor`]); [`MockRemote`] and
//! [`MockConnectivity`] are the in-memory doubles used throughout the
//! tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod engine;
mod error;
mod queue;
mod remote;
mod resolver;
mod scheduler;

pub use config::SyncConfig;
pub use connectivity::{ConnectivityListener, ConnectivityMonitor, MockConnectivity, SubscriptionId};
pub use engine::{SyncEngine, SyncReport, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
pub use queue::{CallOutcome, OfflineQueue, ReplaySummary};
pub use remote::{MockRemote, RemoteClient, RemoteDocument, RemoteError, RemoteResult};
pub use resolver::{resolve, ConflictStrategy, Resolution};
