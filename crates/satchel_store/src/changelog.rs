//! Append-only ledger of local mutations awaiting push.

use crate::error::{StoreError, StoreResult};
use crate::now_millis;
use parking_lot::RwLock;
use satchel_storage::KeyValueBackend;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const CHANGELOG_KEY: &str = "changelog";

/// The kind of local mutation recorded in a [`ChangeEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A document was created locally.
    Create,
    /// A document was updated locally.
    Update,
    /// A document was deleted locally.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => f.write_str("create"),
            Operation::Update => f.write_str("update"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

/// One recorded local mutation.
///
/// Entries are created on the application write path, flipped to
/// `synced` once the push phase confirms acceptance (or a conflict is
/// resolved), and eventually pruned. They are never otherwise mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    /// Process-unique entry id.
    pub id: Uuid,
    /// Logical collection the mutation belongs to.
    pub collection: String,
    /// Id of the affected document.
    pub document_id: String,
    /// What happened.
    pub operation: Operation,
    /// Document body for create/update; absent for delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Local wall-clock time of the mutation, milliseconds since epoch.
    pub timestamp: i64,
    /// False until the push phase confirms acceptance by the remote.
    pub synced: bool,
}

/// Append-only ledger of pending local mutations.
///
/// The source of truth for "what must be pushed". The log is persisted
/// as a whole under one backend key; an in-memory image serves reads so
/// the application read path never blocks on storage.
///
/// # Invariants
///
/// - Entries appear in append order and keep it
/// - An append that fails to persist is not observable afterwards
/// - Entries are only ever appended, flagged `synced`, or pruned
/// - Pruning never removes unsynced entries
pub struct ChangeLog {
    backend: Arc<dyn KeyValueBackend>,
    entries: RwLock<Vec<ChangeEntry>>,
}

impl ChangeLog {
    /// Opens the change log, loading any persisted entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the persisted
    /// log is malformed.
    pub fn open(backend: Arc<dyn KeyValueBackend>) -> StoreResult<Self> {
        let entries = match backend.read(CHANGELOG_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };
        Ok(Self {
            backend,
            entries: RwLock::new(entries),
        })
    }

    /// Records a local mutation.
    ///
    /// Assigns the entry id and timestamp, sets `synced = false`, and
    /// persists the log before returning. Create and update require a
    /// payload; a delete payload is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails - the caller must
    /// then reject the original mutation.
    pub fn append(
        &self,
        collection: &str,
        document_id: &str,
        operation: Operation,
        payload: Option<Value>,
    ) -> StoreResult<ChangeEntry> {
        if payload.is_none() && operation != Operation::Delete {
            return Err(StoreError::MissingPayload { operation });
        }

        let entry = ChangeEntry {
            id: Uuid::new_v4(),
            collection: collection.to_string(),
            document_id: document_id.to_string(),
            operation,
            payload: if operation == Operation::Delete {
                None
            } else {
                payload
            },
            timestamp: now_millis(),
            synced: false,
        };

        let mut entries = self.entries.write();
        entries.push(entry.clone());
        if let Err(e) = self.persist(&entries) {
            entries.pop();
            return Err(e);
        }
        Ok(entry)
    }

    /// Returns all unsynced entries in append order.
    pub fn unsynced(&self) -> Vec<ChangeEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| !e.synced)
            .cloned()
            .collect()
    }

    /// Flags the given entries as synced, persisting once for the batch.
    ///
    /// Unknown ids and already-synced entries are ignored, so replaying
    /// a `mark_synced` after a crash is safe. Returns how many entries
    /// were newly flagged.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails; no flag change is
    /// observable in that case.
    pub fn mark_synced(&self, ids: &[Uuid]) -> StoreResult<usize> {
        let mut entries = self.entries.write();
        let mut flipped = Vec::new();
        for (index, entry) in entries.iter_mut().enumerate() {
            if !entry.synced && ids.contains(&entry.id) {
                entry.synced = true;
                flipped.push(index);
            }
        }
        if flipped.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.persist(&entries) {
            for index in &flipped {
                entries[*index].synced = false;
            }
            return Err(e);
        }
        Ok(flipped.len())
    }

    /// Removes synced entries older than `max_age`.
    ///
    /// Storage hygiene only - unsynced entries are never pruned,
    /// whatever their age. Returns how many entries were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails; the log is left
    /// unchanged in that case.
    pub fn prune(&self, max_age: Duration) -> StoreResult<usize> {
        let cutoff = now_millis().saturating_sub(max_age.as_millis() as i64);
        let mut entries = self.entries.write();
        let before = entries.len();
        let snapshot = entries.clone();
        entries.retain(|e| !(e.synced && e.timestamp < cutoff));
        let removed = before - entries.len();
        if removed == 0 {
            return Ok(0);
        }
        if let Err(e) = self.persist(&entries) {
            *entries = snapshot;
            return Err(e);
        }
        Ok(removed)
    }

    /// Returns true if an unsynced delete exists for the document.
    ///
    /// The pull phase uses this to keep local deletes authoritative
    /// until they are pushed.
    pub fn has_pending_delete(&self, collection: &str, document_id: &str) -> bool {
        self.entries.read().iter().any(|e| {
            !e.synced
                && e.operation == Operation::Delete
                && e.collection == collection
                && e.document_id == document_id
        })
    }

    /// Returns a copy of the full log, for diagnostics and tests.
    pub fn entries(&self) -> Vec<ChangeEntry> {
        self.entries.read().clone()
    }

    /// Returns the total number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the log has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn persist(&self, entries: &[ChangeEntry]) -> StoreResult<()> {
        let bytes = serde_json::to_vec(entries)?;
        self.backend.write(CHANGELOG_KEY, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_storage::MemoryBackend;
    use serde_json::json;

    fn open_log() -> (Arc<MemoryBackend>, ChangeLog) {
        let backend = Arc::new(MemoryBackend::new());
        let log = ChangeLog::open(Arc::clone(&backend) as Arc<dyn KeyValueBackend>).unwrap();
        (backend, log)
    }

    #[test]
    fn append_assigns_identity() {
        let (_, log) = open_log();

        let entry = log
            .append("notes", "n1", Operation::Create, Some(json!({"title": "a"})))
            .unwrap();

        assert_eq!(entry.collection, "notes");
        assert_eq!(entry.document_id, "n1");
        assert!(!entry.synced);
        assert!(entry.timestamp > 0);
        assert_eq!(log.unsynced(), vec![entry]);
    }

    #[test]
    fn append_order_is_stable() {
        let (_, log) = open_log();

        for i in 0..5 {
            log.append(
                "notes",
                &format!("n{i}"),
                Operation::Create,
                Some(json!({ "i": i })),
            )
            .unwrap();
        }

        let ids: Vec<_> = log.unsynced().iter().map(|e| e.document_id.clone()).collect();
        assert_eq!(ids, vec!["n0", "n1", "n2", "n3", "n4"]);
    }

    #[test]
    fn create_without_payload_rejected() {
        let (_, log) = open_log();
        let result = log.append("notes", "n1", Operation::Create, None);
        assert!(matches!(result, Err(StoreError::MissingPayload { .. })));
        assert!(log.is_empty());
    }

    #[test]
    fn delete_payload_dropped() {
        let (_, log) = open_log();
        let entry = log
            .append("notes", "n1", Operation::Delete, Some(json!({"stray": true})))
            .unwrap();
        assert_eq!(entry.payload, None);
    }

    #[test]
    fn failed_append_is_not_observable() {
        let (backend, log) = open_log();
        backend.set_fail_writes(true);

        let result = log.append("notes", "n1", Operation::Create, Some(json!({})));
        assert!(result.is_err());
        assert!(log.is_empty());

        backend.set_fail_writes(false);
        log.append("notes", "n1", Operation::Create, Some(json!({})))
            .unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn mark_synced_batch() {
        let (_, log) = open_log();
        let a = log
            .append("notes", "a", Operation::Create, Some(json!({})))
            .unwrap();
        let b = log
            .append("notes", "b", Operation::Create, Some(json!({})))
            .unwrap();
        let c = log
            .append("notes", "c", Operation::Create, Some(json!({})))
            .unwrap();

        let flagged = log.mark_synced(&[a.id, c.id]).unwrap();
        assert_eq!(flagged, 2);

        let unsynced = log.unsynced();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, b.id);

        // Replaying the same ids is a no-op
        assert_eq!(log.mark_synced(&[a.id, c.id]).unwrap(), 0);
    }

    #[test]
    fn failed_mark_synced_rolls_back() {
        let (backend, log) = open_log();
        let entry = log
            .append("notes", "a", Operation::Create, Some(json!({})))
            .unwrap();

        backend.set_fail_writes(true);
        assert!(log.mark_synced(&[entry.id]).is_err());
        assert_eq!(log.unsynced().len(), 1);
    }

    #[test]
    fn prune_spares_unsynced_entries() {
        let (_, log) = open_log();
        let old_synced = log
            .append("notes", "a", Operation::Create, Some(json!({})))
            .unwrap();
        log.append("notes", "b", Operation::Create, Some(json!({})))
            .unwrap();
        log.mark_synced(&[old_synced.id]).unwrap();

        // Everything is newer than the cutoff: nothing removed
        assert_eq!(log.prune(Duration::from_secs(3600)).unwrap(), 0);

        // Zero retention removes the synced entry only
        assert_eq!(log.prune(Duration::ZERO).unwrap(), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.unsynced().len(), 1);
    }

    #[test]
    fn pending_delete_lookup() {
        let (_, log) = open_log();
        log.append("notes", "a", Operation::Delete, None).unwrap();

        assert!(log.has_pending_delete("notes", "a"));
        assert!(!log.has_pending_delete("notes", "b"));
        assert!(!log.has_pending_delete("other", "a"));

        let ids: Vec<_> = log.unsynced().iter().map(|e| e.id).collect();
        log.mark_synced(&ids).unwrap();
        assert!(!log.has_pending_delete("notes", "a"));
    }

    #[test]
    fn reopen_restores_entries() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let log = ChangeLog::open(Arc::clone(&backend) as Arc<dyn KeyValueBackend>).unwrap();
            log.append("notes", "a", Operation::Create, Some(json!({"x": 1})))
                .unwrap();
        }

        let log = ChangeLog::open(backend).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.unsynced()[0].document_id, "a");
    }
}
