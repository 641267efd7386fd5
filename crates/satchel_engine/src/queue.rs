//! Connectivity-aware request dispatch with a durable outbox.

use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteClient, RemoteError};
use parking_lot::Mutex;
use satchel_store::{LocalStore, OutboundRequest};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What happened to a request handed to [`OfflineQueue::call`].
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The request reached the remote; here is its response body.
    Sent(Value),
    /// The request was persisted for later replay under this id.
    Queued(Uuid),
}

/// Totals from one [`OfflineQueue::replay`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Requests accepted by the remote and removed from the outbox.
    pub replayed: usize,
    /// Requests that failed and stay queued for the next pass.
    pub failed: usize,
}

/// Sends mutating requests when the network is up and persists them in
/// the [`LocalStore`] outbox when it is not.
///
/// A mutating call made offline, or one that dies to a transport
/// failure mid-flight, is queued rather than lost. Reads are never
/// queued; a stale answer delivered later is worthless, so an offline
/// read fails immediately. Queued requests replay in FIFO order; a
/// failed replay keeps the request (and everything is retried on the
/// next pass), so replay passes never block behind one bad request.
pub struct OfflineQueue<R: RemoteClient, C: ConnectivityMonitor> {
    store: Arc<LocalStore>,
    remote: Arc<R>,
    connectivity: Arc<C>,
    replay_guard: Mutex<()>,
}

impl<R: RemoteClient, C: ConnectivityMonitor> OfflineQueue<R, C> {
    /// Creates a queue over the given store, remote and connectivity
    /// source.
    pub fn new(store: Arc<LocalStore>, remote: Arc<R>, connectivity: Arc<C>) -> Self {
        Self {
            store,
            remote,
            connectivity,
            replay_guard: Mutex::new(()),
        }
    }

    /// Number of requests waiting for replay.
    pub fn pending(&self) -> usize {
        self.store.outbox().len()
    }

    /// Executes a request now if possible, otherwise defers it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoConnectivity`] for an offline read,
    /// propagates storage failures from enqueueing, and propagates
    /// non-retryable remote rejections (the remote saw the request and
    /// said no; queueing it again would not help).
    pub fn call(&self, request: OutboundRequest) -> SyncResult<CallOutcome> {
        if !request.method.is_mutating() {
            if !self.connectivity.is_connected() {
                return Err(SyncError::NoConnectivity);
            }
            let value = self.remote.execute(&request)?;
            return Ok(CallOutcome::Sent(value));
        }

        if !self.connectivity.is_connected() {
            return self.defer(request);
        }

        match self.remote.execute(&request) {
            Ok(value) => Ok(CallOutcome::Sent(value)),
            Err(e @ (RemoteError::Network(_) | RemoteError::Timeout)) => {
                // The link dropped under us; treat it like an offline call
                debug!(error = %e, "request failed in flight, deferring");
                self.defer(request)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replays queued requests in order, removing the ones the remote
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns an error only when the outbox itself cannot be updated;
    /// individual request failures are counted in the summary.
    pub fn replay(&self) -> SyncResult<ReplaySummary> {
        let _pass = self.replay_guard.lock();

        let pending = self.store.outbox().pending();
        if pending.is_empty() {
            return Ok(ReplaySummary::default());
        }
        debug!(pending = pending.len(), "replaying queued requests");

        let mut accepted: Vec<Uuid> = Vec::new();
        let mut failed = 0;
        for queued in &pending {
            match self.remote.execute(&queued.request) {
                Ok(_) => accepted.push(queued.id),
                Err(e) => {
                    failed += 1;
                    warn!(
                        endpoint = queued.request.endpoint.as_str(),
                        error = %e,
                        "replay failed, request stays queued"
                    );
                }
            }
        }

        if !accepted.is_empty() {
            self.store.outbox().remove(&accepted)?;
        }
        let summary = ReplaySummary {
            replayed: accepted.len(),
            failed,
        };
        info!(
            replayed = summary.replayed,
            failed = summary.failed,
            "replay pass finished"
        );
        Ok(summary)
    }

    fn defer(&self, request: OutboundRequest) -> SyncResult<CallOutcome> {
        let queued = self.store.outbox().enqueue(request)?;
        debug!(
            id = %queued.id,
            endpoint = queued.request.endpoint.as_str(),
            "request queued for replay"
        );
        Ok(CallOutcome::Queued(queued.id))
    }
}
