//! # Satchel Storage
//!
//! Durable key-value backend trait and implementations for satchel.
//!
//! This crate provides the lowest-level storage abstraction for the
//! offline-first sync engine. Backends are **opaque byte stores** - they
//! do not interpret the data they hold.
//!
//! ## Design Principles
//!
//! - Backends are simple keyed byte stores (read, write, remove)
//! - No knowledge of change-log, document or cursor formats
//! - Must be `Send + Sync` for concurrent access
//! - The stores built on top own all serialization
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use satchel_storage::{KeyValueBackend, MemoryBackend};
//!
//! let backend = MemoryBackend::new();
//! backend.write("changelog", b"[]").unwrap();
//! assert_eq!(backend.read("changelog").unwrap(), Some(b"[]".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::KeyValueBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
