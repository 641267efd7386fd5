//! Durable FIFO of deferred outbound requests.

use crate::error::StoreResult;
use crate::now_millis;
use crate::request::OutboundRequest;
use parking_lot::RwLock;
use satchel_storage::KeyValueBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const OUTBOX_KEY: &str = "outbox";

/// One deferred outbound call, recorded while disconnected.
///
/// Lives independently of the change log: the outbox carries ad hoc
/// mutating calls made outside the structured sync protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequest {
    /// Queue entry id.
    pub id: Uuid,
    /// The request to replay verbatim.
    pub request: OutboundRequest,
    /// When the request was queued, milliseconds since epoch.
    pub enqueued_at: i64,
}

/// Durable FIFO of requests that could not be sent for lack of
/// connectivity.
///
/// Entries are consumed on successful replay and left in place on
/// failure; replay order is enqueue order.
pub struct OutboxStore {
    backend: Arc<dyn KeyValueBackend>,
    queue: RwLock<Vec<QueuedRequest>>,
}

impl OutboxStore {
    /// Opens the outbox, loading any persisted entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the persisted
    /// queue is malformed.
    pub fn open(backend: Arc<dyn KeyValueBackend>) -> StoreResult<Self> {
        let queue = match backend.read(OUTBOX_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };
        Ok(Self {
            backend,
            queue: RwLock::new(queue),
        })
    }

    /// Appends a request to the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails; the request is not
    /// queued in that case and the caller must surface the failure.
    pub fn enqueue(&self, request: OutboundRequest) -> StoreResult<QueuedRequest> {
        let queued = QueuedRequest {
            id: Uuid::new_v4(),
            request,
            enqueued_at: now_millis(),
        };

        let mut queue = self.queue.write();
        queue.push(queued.clone());
        if let Err(e) = self.persist(&queue) {
            queue.pop();
            return Err(e);
        }
        Ok(queued)
    }

    /// Returns all queued requests in enqueue order.
    pub fn pending(&self) -> Vec<QueuedRequest> {
        self.queue.read().clone()
    }

    /// Removes successfully replayed requests. Returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails; the queue is left
    /// unchanged in that case.
    pub fn remove(&self, ids: &[Uuid]) -> StoreResult<usize> {
        let mut queue = self.queue.write();
        let before = queue.len();
        let snapshot = queue.clone();
        queue.retain(|q| !ids.contains(&q.id));
        let removed = before - queue.len();
        if removed == 0 {
            return Ok(0);
        }
        if let Err(e) = self.persist(&queue) {
            *queue = snapshot;
            return Err(e);
        }
        Ok(removed)
    }

    /// Returns the number of queued requests.
    pub fn len(&self) -> usize {
        self.queue.read().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.read().is_empty()
    }

    fn persist(&self, queue: &[QueuedRequest]) -> StoreResult<()> {
        let bytes = serde_json::to_vec(queue)?;
        self.backend.write(OUTBOX_KEY, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_storage::MemoryBackend;
    use serde_json::json;

    fn open_outbox() -> (Arc<MemoryBackend>, OutboxStore) {
        let backend = Arc::new(MemoryBackend::new());
        let outbox = OutboxStore::open(Arc::clone(&backend) as Arc<dyn KeyValueBackend>).unwrap();
        (backend, outbox)
    }

    #[test]
    fn enqueue_preserves_order() {
        let (_, outbox) = open_outbox();

        for i in 0..3 {
            outbox
                .enqueue(OutboundRequest::post(format!("/notes/{i}"), json!({ "i": i })))
                .unwrap();
        }

        let endpoints: Vec<_> = outbox
            .pending()
            .into_iter()
            .map(|q| q.request.endpoint)
            .collect();
        assert_eq!(endpoints, vec!["/notes/0", "/notes/1", "/notes/2"]);
    }

    #[test]
    fn remove_consumes_entries() {
        let (_, outbox) = open_outbox();

        let a = outbox
            .enqueue(OutboundRequest::delete("/notes/a"))
            .unwrap();
        let b = outbox
            .enqueue(OutboundRequest::delete("/notes/b"))
            .unwrap();
        let c = outbox
            .enqueue(OutboundRequest::delete("/notes/c"))
            .unwrap();

        assert_eq!(outbox.remove(&[a.id, c.id]).unwrap(), 2);
        let remaining = outbox.pending();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);

        // Unknown ids are ignored
        assert_eq!(outbox.remove(&[a.id]).unwrap(), 0);
    }

    #[test]
    fn failed_enqueue_is_not_observable() {
        let (backend, outbox) = open_outbox();

        backend.set_fail_writes(true);
        assert!(outbox
            .enqueue(OutboundRequest::delete("/notes/a"))
            .is_err());
        assert!(outbox.is_empty());
    }

    #[test]
    fn reopen_restores_queue() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let outbox =
                OutboxStore::open(Arc::clone(&backend) as Arc<dyn KeyValueBackend>).unwrap();
            outbox
                .enqueue(OutboundRequest::put("/notes/n1", json!({"v": 1})))
                .unwrap();
        }

        let outbox = OutboxStore::open(backend).unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox.pending()[0].request.endpoint, "/notes/n1");
    }
}
