//! Review list for conflicts awaiting manual resolution.

use crate::error::StoreResult;
use crate::now_millis;
use parking_lot::RwLock;
use satchel_storage::KeyValueBackend;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

const CONFLICTS_KEY: &str = "conflicts";

/// One conflict surfaced under the manual strategy.
///
/// Both versions are captured when available so a reviewer can choose;
/// the record persists until explicitly resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConflict {
    /// Conflict record id.
    pub id: Uuid,
    /// Collection of the contested document.
    pub collection: String,
    /// Id of the contested document.
    pub document_id: String,
    /// The local version, if the change carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<Value>,
    /// The remote version at the time of the conflict, if fetchable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<Value>,
    /// When the conflict was recorded, milliseconds since epoch.
    pub recorded_at: i64,
}

/// Durable list of conflicts needing human or UI review.
pub struct ConflictStore {
    backend: Arc<dyn KeyValueBackend>,
    conflicts: RwLock<Vec<PendingConflict>>,
}

impl ConflictStore {
    /// Opens the conflict store, loading any persisted records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the persisted
    /// list is malformed.
    pub fn open(backend: Arc<dyn KeyValueBackend>) -> StoreResult<Self> {
        let conflicts = match backend.read(CONFLICTS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };
        Ok(Self {
            backend,
            conflicts: RwLock::new(conflicts),
        })
    }

    /// Records a conflict for later review.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails.
    pub fn record(
        &self,
        collection: &str,
        document_id: &str,
        local: Option<Value>,
        remote: Option<Value>,
    ) -> StoreResult<PendingConflict> {
        let conflict = PendingConflict {
            id: Uuid::new_v4(),
            collection: collection.to_string(),
            document_id: document_id.to_string(),
            local,
            remote,
            recorded_at: now_millis(),
        };

        let mut conflicts = self.conflicts.write();
        conflicts.push(conflict.clone());
        if let Err(e) = self.persist(&conflicts) {
            conflicts.pop();
            return Err(e);
        }
        Ok(conflict)
    }

    /// Returns all unresolved conflicts, oldest first.
    pub fn pending(&self) -> Vec<PendingConflict> {
        self.conflicts.read().clone()
    }

    /// Removes a resolved conflict. Returns false if the id is unknown,
    /// so resolving twice is safe.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails; the record is kept
    /// in that case.
    pub fn resolve(&self, id: Uuid) -> StoreResult<bool> {
        let mut conflicts = self.conflicts.write();
        let Some(index) = conflicts.iter().position(|c| c.id == id) else {
            return Ok(false);
        };
        let removed = conflicts.remove(index);
        if let Err(e) = self.persist(&conflicts) {
            conflicts.insert(index, removed);
            return Err(e);
        }
        Ok(true)
    }

    /// Returns the number of unresolved conflicts.
    pub fn len(&self) -> usize {
        self.conflicts.read().len()
    }

    /// Returns true if nothing awaits review.
    pub fn is_empty(&self) -> bool {
        self.conflicts.read().is_empty()
    }

    fn persist(&self, conflicts: &[PendingConflict]) -> StoreResult<()> {
        let bytes = serde_json::to_vec(conflicts)?;
        self.backend.write(CONFLICTS_KEY, &bytes)?;
        Ok(())
    }
}
