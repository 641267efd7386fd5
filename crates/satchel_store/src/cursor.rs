//! Per-collection pull watermarks.

use crate::error::StoreResult;
use crate::now_millis;
use parking_lot::RwLock;
use satchel_storage::KeyValueBackend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const CURSORS_KEY: &str = "cursors";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorState {
    #[serde(default)]
    since: BTreeMap<String, i64>,
    #[serde(default)]
    last_attempt: i64,
}

/// Per-collection watermarks of the last successfully pulled point in
/// remote history, plus the global "last full sync attempt" timestamp
/// used for cursor bootstrap.
///
/// Cursors advance monotonically and are never rewound except by an
/// explicit [`CursorStore::reset`] (full resync).
pub struct CursorStore {
    backend: Arc<dyn KeyValueBackend>,
    state: RwLock<CursorState>,
}

impl CursorStore {
    /// Opens the cursor store, loading any persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the persisted
    /// state is malformed.
    pub fn open(backend: Arc<dyn KeyValueBackend>) -> StoreResult<Self> {
        let state = match backend.read(CURSORS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => CursorState::default(),
        };
        Ok(Self {
            backend,
            state: RwLock::new(state),
        })
    }

    /// Returns the watermark for a collection; 0 if never pulled.
    pub fn since(&self, collection: &str) -> i64 {
        self.state
            .read()
            .since
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    /// Advances the watermark for a collection.
    ///
    /// Monotonic: a watermark lower than the current one is ignored.
    /// Returns true if the cursor moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails; the cursor is left
    /// unchanged in that case.
    pub fn advance(&self, collection: &str, watermark: i64) -> StoreResult<bool> {
        let mut state = self.state.write();
        let current = state.since.get(collection).copied().unwrap_or(0);
        if watermark <= current {
            return Ok(false);
        }
        state.since.insert(collection.to_string(), watermark);
        if let Err(e) = self.persist(&state) {
            state.since.insert(collection.to_string(), current);
            if current == 0 {
                state.since.remove(collection);
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Rewinds a collection to 0 for an explicit full resync.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails.
    pub fn reset(&self, collection: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        let previous = state.since.remove(collection);
        if let Err(e) = self.persist(&state) {
            if let Some(p) = previous {
                state.since.insert(collection.to_string(), p);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Returns the timestamp of the last completed sync attempt.
    pub fn last_attempt(&self) -> i64 {
        self.state.read().last_attempt
    }

    /// Records that a sync cycle ran to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails.
    pub fn touch_last_attempt(&self) -> StoreResult<i64> {
        let mut state = self.state.write();
        let previous = state.last_attempt;
        state.last_attempt = now_millis();
        if let Err(e) = self.persist(&state) {
            state.last_attempt = previous;
            return Err(e);
        }
        Ok(state.last_attempt)
    }

    fn persist(&self, state: &CursorState) -> StoreResult<()> {
        let bytes = serde_json::to_vec(state)?;
        self.backend.write(CURSORS_KEY, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_storage::MemoryBackend;

    fn open_cursors() -> (Arc<MemoryBackend>, CursorStore) {
        let backend = Arc::new(MemoryBackend::new());
        let cursors = CursorStore::open(Arc::clone(&backend) as Arc<dyn KeyValueBackend>).unwrap();
        (backend, cursors)
    }

    #[test]
    fn defaults_to_zero() {
        let (_, cursors) = open_cursors();
        assert_eq!(cursors.since("templates"), 0);
        assert_eq!(cursors.last_attempt(), 0);
    }

    #[test]
    fn advance_is_monotonic() {
        let (_, cursors) = open_cursors();

        assert!(cursors.advance("templates", 100).unwrap());
        assert_eq!(cursors.since("templates"), 100);

        // Lower or equal watermarks never rewind
        assert!(!cursors.advance("templates", 50).unwrap());
        assert!(!cursors.advance("templates", 100).unwrap());
        assert_eq!(cursors.since("templates"), 100);

        assert!(cursors.advance("templates", 101).unwrap());
        assert_eq!(cursors.since("templates"), 101);
    }

    #[test]
    fn collections_are_independent() {
        let (_, cursors) = open_cursors();

        cursors.advance("templates", 10).unwrap();
        cursors.advance("notes", 20).unwrap();

        assert_eq!(cursors.since("templates"), 10);
        assert_eq!(cursors.since("notes"), 20);
    }

    #[test]
    fn reset_rewinds_to_zero() {
        let (_, cursors) = open_cursors();

        cursors.advance("templates", 100).unwrap();
        cursors.reset("templates").unwrap();
        assert_eq!(cursors.since("templates"), 0);
    }

    #[test]
    fn failed_advance_leaves_cursor() {
        let (backend, cursors) = open_cursors();

        cursors.advance("templates", 10).unwrap();
        backend.set_fail_writes(true);
        assert!(cursors.advance("templates", 20).is_err());
        assert_eq!(cursors.since("templates"), 10);
    }

    #[test]
    fn touch_last_attempt_persists() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let cursors =
                CursorStore::open(Arc::clone(&backend) as Arc<dyn KeyValueBackend>).unwrap();
            let at = cursors.touch_last_attempt().unwrap();
            assert!(at > 0);
        }

        let cursors = CursorStore::open(backend).unwrap();
        assert!(cursors.last_attempt() > 0);
    }

    #[test]
    fn reopen_restores_watermarks() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let cursors =
                CursorStore::open(Arc::clone(&backend) as Arc<dyn KeyValueBackend>).unwrap();
            cursors.advance("templates", 42).unwrap();
        }

        let cursors = CursorStore::open(backend).unwrap();
        assert_eq!(cursors.since("templates"), 42);
    }
}
