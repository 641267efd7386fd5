//! The combined local store with the log-then-apply write discipline.

use crate::changelog::{ChangeEntry, ChangeLog, Operation};
use crate::conflicts::ConflictStore;
use crate::cursor::CursorStore;
use crate::document::{DocumentStore, LocalDocument};
use crate::error::StoreResult;
use crate::outbox::OutboxStore;
use satchel_storage::KeyValueBackend;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Everything the client persists locally, over one shared backend:
/// documents, change log, cursors, outbox and the conflict review list.
///
/// `LocalStore` is the only write path for application code. Its
/// `create`/`update`/`delete` methods append to the change log **before**
/// touching the document store, so there is never a document state with
/// no corresponding log entry. A storage failure on the log append
/// propagates to the caller and the mutation is rejected outright.
///
/// The sync coordinator uses [`LocalStore::apply_remote`] and
/// [`LocalStore::remove_remote`] for pulled state, which bypass the
/// change log by design - remote deltas are not local mutations.
pub struct LocalStore {
    documents: DocumentStore,
    changelog: ChangeLog,
    cursors: CursorStore,
    outbox: OutboxStore,
    conflicts: ConflictStore,
}

impl LocalStore {
    /// Opens all component stores over the given backend.
    ///
    /// # Errors
    ///
    /// Returns an error if any persisted component state cannot be
    /// loaded.
    pub fn open(backend: Arc<dyn KeyValueBackend>) -> StoreResult<Self> {
        Ok(Self {
            documents: DocumentStore::new(Arc::clone(&backend)),
            changelog: ChangeLog::open(Arc::clone(&backend))?,
            cursors: CursorStore::open(Arc::clone(&backend))?,
            outbox: OutboxStore::open(Arc::clone(&backend))?,
            conflicts: ConflictStore::open(backend)?,
        })
    }

    /// Creates a document locally, recording the change for push.
    ///
    /// # Errors
    ///
    /// Returns an error if the log entry or the document write fails.
    /// When the log append fails nothing is applied; when the document
    /// write fails the log entry remains and push will replay it.
    pub fn create(&self, collection: &str, id: &str, data: Value) -> StoreResult<ChangeEntry> {
        let entry = self
            .changelog
            .append(collection, id, Operation::Create, Some(data.clone()))?;
        self.documents.put(collection, id, data)?;
        debug!(collection, id, "recorded local create");
        Ok(entry)
    }

    /// Updates a document locally, recording the change for push.
    ///
    /// # Errors
    ///
    /// Same failure semantics as [`LocalStore::create`].
    pub fn update(&self, collection: &str, id: &str, data: Value) -> StoreResult<ChangeEntry> {
        let entry = self
            .changelog
            .append(collection, id, Operation::Update, Some(data.clone()))?;
        self.documents.put(collection, id, data)?;
        debug!(collection, id, "recorded local update");
        Ok(entry)
    }

    /// Deletes a document locally, recording the change for push.
    ///
    /// # Errors
    ///
    /// Same failure semantics as [`LocalStore::create`].
    pub fn delete(&self, collection: &str, id: &str) -> StoreResult<ChangeEntry> {
        let entry = self
            .changelog
            .append(collection, id, Operation::Delete, None)?;
        self.documents.delete(collection, id)?;
        debug!(collection, id, "recorded local delete");
        Ok(entry)
    }

    /// Returns all documents in a collection, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded.
    pub fn documents(&self, collection: &str) -> StoreResult<Vec<LocalDocument>> {
        self.documents.documents(collection)
    }

    /// Returns one document, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded.
    pub fn document(&self, collection: &str, id: &str) -> StoreResult<Option<LocalDocument>> {
        self.documents.get(collection, id)
    }

    /// Overwrites a document with a pulled remote version.
    ///
    /// No change log entry is made: this is the sync path, not a local
    /// mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails.
    pub fn apply_remote(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> StoreResult<LocalDocument> {
        self.documents.put(collection, id, data)
    }

    /// Removes a document because the remote says it is gone.
    ///
    /// No change log entry is made. Returns true if the document
    /// existed locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails.
    pub fn remove_remote(&self, collection: &str, id: &str) -> StoreResult<bool> {
        self.documents.delete(collection, id)
    }

    /// The change log.
    pub fn changelog(&self) -> &ChangeLog {
        &self.changelog
    }

    /// The per-collection pull cursors.
    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    /// The offline request outbox.
    pub fn outbox(&self) -> &OutboxStore {
        &self.outbox
    }

    /// The manual-conflict review list.
    pub fn conflicts(&self) -> &ConflictStore {
        &self.conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_storage::MemoryBackend;
    use serde_json::json;

    fn open_store() -> (Arc<MemoryBackend>, LocalStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = LocalStore::open(Arc::clone(&backend) as Arc<dyn KeyValueBackend>).unwrap();
        (backend, store)
    }

    #[test]
    fn every_mutation_produces_one_entry() {
        let (_, store) = open_store();

        store.create("notes", "a", json!({"v": 1})).unwrap();
        store.update("notes", "a", json!({"v": 2})).unwrap();
        store.delete("notes", "a").unwrap();

        let entries = store.changelog().entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].operation, Operation::Create);
        assert_eq!(entries[1].operation, Operation::Update);
        assert_eq!(entries[2].operation, Operation::Delete);
    }

    #[test]
    fn read_after_write() {
        let (_, store) = open_store();

        store.create("notes", "a", json!({"title": "x"})).unwrap();
        let doc = store.document("notes", "a").unwrap().unwrap();
        assert_eq!(doc.data, json!({"title": "x"}));

        store.delete("notes", "a").unwrap();
        assert_eq!(store.document("notes", "a").unwrap(), None);
    }

    #[test]
    fn failed_log_append_rejects_mutation() {
        let (backend, store) = open_store();
        backend.set_fail_writes(true);

        assert!(store.create("notes", "a", json!({})).is_err());

        backend.set_fail_writes(false);
        // Neither the log nor the document store saw the mutation
        assert!(store.changelog().is_empty());
        assert!(store.documents("notes").unwrap().is_empty());
    }

    #[test]
    fn apply_remote_bypasses_changelog() {
        let (_, store) = open_store();

        store
            .apply_remote("templates", "t1", json!({"pulled": true}))
            .unwrap();

        assert!(store.changelog().is_empty());
        let doc = store.document("templates", "t1").unwrap().unwrap();
        assert_eq!(doc.data, json!({"pulled": true}));

        assert!(store.remove_remote("templates", "t1").unwrap());
        assert!(store.changelog().is_empty());
    }

    #[test]
    fn state_survives_reopen() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store =
                LocalStore::open(Arc::clone(&backend) as Arc<dyn KeyValueBackend>).unwrap();
            store.create("notes", "a", json!({"v": 1})).unwrap();
            store.cursors().advance("notes", 7).unwrap();
        }

        let store = LocalStore::open(backend).unwrap();
        assert_eq!(store.changelog().unsynced().len(), 1);
        assert_eq!(store.cursors().since("notes"), 7);
        assert!(store.document("notes", "a").unwrap().is_some());
    }
}
