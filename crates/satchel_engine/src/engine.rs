//! The sync coordinator: push, pull, resolve, repeat.

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteClient, RemoteDocument};
use crate::resolver::{resolve, Resolution};
use crate::scheduler::SchedulerHandle;
use parking_lot::{Mutex, RwLock};
use satchel_store::{ChangeEntry, LocalStore, Operation, OutboundRequest};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Coordinator phase, observable while a cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle in flight.
    Idle,
    /// Replaying local changes to the remote.
    Pushing,
    /// Fetching remote deltas.
    Pulling,
    /// The last cycle could not run at all.
    Failed,
}

impl SyncState {
    /// True while a cycle is in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pushing | Self::Pulling)
    }
}

/// Running totals across cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed cycles, whether or not they reported errors.
    pub cycles_completed: u64,
    /// Change entries confirmed by the remote.
    pub entries_pushed: u64,
    /// Documents applied from pull deltas.
    pub documents_pulled: u64,
    /// Conflicts decided or surfaced.
    pub conflicts_resolved: u64,
    /// First error of the most recent cycle, if any.
    pub last_error: Option<String>,
}

/// Outcome of one sync cycle.
///
/// A cycle always yields a report; per-item failures land in `errors`
/// while the rest of the cycle proceeds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Change entries confirmed by the remote this cycle.
    pub pushed: usize,
    /// Documents applied from pull deltas this cycle.
    pub pulled: usize,
    /// Conflicts decided or surfaced this cycle.
    pub conflicts: usize,
    /// Human-readable descriptions of everything that went wrong.
    pub errors: Vec<String>,
}

impl SyncReport {
    fn aborted(message: String) -> Self {
        Self {
            errors: vec![message],
            ..Self::default()
        }
    }

    /// True if the cycle finished without any errors.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

enum PushOutcome {
    Accepted,
    ConflictResolved,
}

/// Drives the full cycle against a remote: push pending local changes,
/// resolve conflicts per the configured strategy, pull remote deltas,
/// advance cursors and prune the log.
///
/// One engine instance owns one scheduler; see
/// [`SyncEngine::start`](crate::SyncEngine::start). Cycles never
/// overlap: a `sync` call while another is in flight returns
/// immediately with an error in the report.
pub struct SyncEngine<R: RemoteClient, C: ConnectivityMonitor> {
    config: SyncConfig,
    remote: Arc<R>,
    connectivity: Arc<C>,
    store: Arc<LocalStore>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cycle_guard: Mutex<()>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl<R: RemoteClient, C: ConnectivityMonitor> SyncEngine<R, C> {
    /// Creates an engine over the given store, remote and connectivity
    /// source. Nothing runs until [`sync`](Self::sync) or
    /// [`start`](crate::SyncEngine::start) is called.
    pub fn new(
        config: SyncConfig,
        remote: Arc<R>,
        connectivity: Arc<C>,
        store: Arc<LocalStore>,
    ) -> Self {
        Self {
            config,
            remote,
            connectivity,
            store,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cycle_guard: Mutex::new(()),
            scheduler: Mutex::new(None),
        }
    }

    /// Current coordinator phase.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Running totals across cycles.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The local store this engine synchronizes.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub(crate) fn connectivity(&self) -> &Arc<C> {
        &self.connectivity
    }

    pub(crate) fn scheduler_slot(&self) -> &Mutex<Option<SchedulerHandle>> {
        &self.scheduler
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs one sync cycle and reports what happened.
    ///
    /// Without connectivity the cycle aborts up front: no cursor moves,
    /// no attempt is recorded, and the report carries a single
    /// "no network connection" error. Per-item failures during the
    /// cycle are collected in the report while the remaining items
    /// proceed. If a cycle is already in flight this call does not
    /// block; it reports the overlap as an error instead.
    pub fn sync(&self) -> SyncReport {
        let Some(_cycle) = self.cycle_guard.try_lock() else {
            debug!("sync cycle already in flight, skipping");
            return SyncReport::aborted(SyncError::SyncInProgress.to_string());
        };

        if !self.connectivity.is_connected() {
            warn!("sync requested without connectivity");
            self.set_state(SyncState::Failed);
            let report = SyncReport::aborted(SyncError::NoConnectivity.to_string());
            self.stats.write().last_error = report.errors.first().cloned();
            return report;
        }

        let mut report = SyncReport::default();

        self.set_state(SyncState::Pushing);
        self.push_phase(&mut report);

        self.set_state(SyncState::Pulling);
        self.pull_phase(&mut report);

        if let Err(e) = self.store.changelog().prune(self.config.retention) {
            report.errors.push(format!("prune: {e}"));
        }
        if let Err(e) = self.store.cursors().touch_last_attempt() {
            report.errors.push(format!("attempt bookkeeping: {e}"));
        }

        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.entries_pushed += report.pushed as u64;
            stats.documents_pulled += report.pulled as u64;
            stats.conflicts_resolved += report.conflicts as u64;
            stats.last_error = report.errors.first().cloned();
        }
        self.set_state(SyncState::Idle);

        info!(
            pushed = report.pushed,
            pulled = report.pulled,
            conflicts = report.conflicts,
            errors = report.errors.len(),
            "sync cycle finished"
        );
        report
    }

    /// Replays unsynced change entries in append order. Confirmed
    /// entries (including resolved conflicts) are flagged in one batch
    /// at the end, so a crash mid-phase re-pushes rather than loses.
    fn push_phase(&self, report: &mut SyncReport) {
        let pending = self.store.changelog().unsynced();
        if pending.is_empty() {
            return;
        }
        debug!(pending = pending.len(), "starting push phase");

        let mut confirmed: Vec<Uuid> = Vec::new();
        for entry in &pending {
            match self.push_entry(entry) {
                Ok(PushOutcome::Accepted) => {
                    report.pushed += 1;
                    confirmed.push(entry.id);
                }
                Ok(PushOutcome::ConflictResolved) => {
                    report.conflicts += 1;
                    confirmed.push(entry.id);
                }
                Err(e) => {
                    warn!(
                        collection = entry.collection.as_str(),
                        document_id = entry.document_id.as_str(),
                        error = %e,
                        "push failed, entry stays pending"
                    );
                    report.errors.push(format!(
                        "push {} {}/{}: {e}",
                        entry.operation, entry.collection, entry.document_id
                    ));
                }
            }
        }

        if !confirmed.is_empty() {
            if let Err(e) = self.store.changelog().mark_synced(&confirmed) {
                report.errors.push(format!("mark synced: {e}"));
            }
        }
    }

    fn push_entry(&self, entry: &ChangeEntry) -> SyncResult<PushOutcome> {
        let request = self.request_for(entry)?;
        match self.remote.execute(&request) {
            Ok(_) => Ok(PushOutcome::Accepted),
            Err(e) if e.is_conflict() => {
                self.resolve_conflict(entry)?;
                Ok(PushOutcome::ConflictResolved)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn request_for(&self, entry: &ChangeEntry) -> SyncResult<OutboundRequest> {
        let payload = || {
            entry
                .payload
                .clone()
                .ok_or_else(|| SyncError::MissingPayload {
                    collection: entry.collection.clone(),
                    document_id: entry.document_id.clone(),
                })
        };
        Ok(match entry.operation {
            Operation::Create => {
                OutboundRequest::post(format!("/{}", entry.collection), payload()?)
            }
            Operation::Update => OutboundRequest::put(
                format!("/{}/{}", entry.collection, entry.document_id),
                payload()?,
            ),
            Operation::Delete => {
                OutboundRequest::delete(format!("/{}/{}", entry.collection, entry.document_id))
            }
        })
    }

    /// Decides a rejected push per the configured strategy and applies
    /// the outcome. An error here (for example, the remote fetch the
    /// decision needs failed) leaves the entry unsynced for the next
    /// cycle.
    fn resolve_conflict(&self, entry: &ChangeEntry) -> SyncResult<()> {
        let remote_doc = if self.config.strategy.needs_remote() {
            self.fetch_remote(&entry.collection, &entry.document_id)?
        } else {
            None
        };

        let resolution = resolve(entry, remote_doc.as_ref(), self.config.strategy);
        debug!(
            collection = entry.collection.as_str(),
            document_id = entry.document_id.as_str(),
            ?resolution,
            "resolving push conflict"
        );
        match resolution {
            Resolution::AcceptRemote => match remote_doc {
                Some(doc) => {
                    self.store
                        .apply_remote(&entry.collection, &entry.document_id, doc.data)?;
                }
                None => {
                    // ServerWins without a fetched copy, or the remote
                    // dropped the document: take the remote's view
                    let doc = self.fetch_remote(&entry.collection, &entry.document_id)?;
                    match doc {
                        Some(doc) => {
                            self.store.apply_remote(
                                &entry.collection,
                                &entry.document_id,
                                doc.data,
                            )?;
                        }
                        None => {
                            self.store
                                .remove_remote(&entry.collection, &entry.document_id)?;
                        }
                    }
                }
            },
            Resolution::ForceLocal => {
                let request = self.request_for(entry)?.with_force(true);
                self.remote.execute(&request)?;
            }
            Resolution::Surface => {
                self.store.conflicts().record(
                    &entry.collection,
                    &entry.document_id,
                    entry.payload.clone(),
                    remote_doc.map(|d| d.data),
                )?;
            }
        }
        Ok(())
    }

    /// Fetches the remote's current version of one document. A 404
    /// means the remote no longer has it; any other failure propagates.
    fn fetch_remote(&self, collection: &str, id: &str) -> SyncResult<Option<RemoteDocument>> {
        let request = OutboundRequest::get(format!("/{collection}/{id}"), Vec::new());
        match self.remote.execute(&request) {
            Ok(value) => {
                let doc = serde_json::from_value(value)
                    .map_err(|e| SyncError::Protocol(format!("document fetch: {e}")))?;
                Ok(Some(doc))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Pulls deltas for each configured collection. A failing
    /// collection is reported and the others still run.
    fn pull_phase(&self, report: &mut SyncReport) {
        for collection in &self.config.collections {
            match self.pull_collection(collection) {
                Ok(applied) => report.pulled += applied,
                Err(e) => {
                    warn!(collection = collection.as_str(), error = %e, "pull failed");
                    report.errors.push(format!("pull {collection}: {e}"));
                }
            }
        }
    }

    fn pull_collection(&self, collection: &str) -> SyncResult<usize> {
        let since = self.store.cursors().since(collection);
        let request = OutboundRequest::get(
            format!("/{collection}"),
            vec![("since".to_string(), since.to_string())],
        );
        let body = self.remote.execute(&request)?;
        let documents: Vec<RemoteDocument> = serde_json::from_value(body)
            .map_err(|e| SyncError::Protocol(format!("pull delta for {collection}: {e}")))?;

        if documents.is_empty() {
            debug!(collection, since, "pull returned no documents");
            return Ok(0);
        }

        let mut applied = 0;
        let mut watermark = since;
        for doc in documents {
            watermark = watermark.max(doc.updated_at);
            // A document we deleted locally but have not pushed yet
            // must not come back through a pull
            if self
                .store
                .changelog()
                .has_pending_delete(collection, &doc.id)
            {
                debug!(
                    collection,
                    document_id = doc.id.as_str(),
                    "skipping pulled document with a pending local delete"
                );
                continue;
            }
            self.store.apply_remote(collection, &doc.id, doc.data)?;
            applied += 1;
        }

        self.store.cursors().advance(collection, watermark)?;
        debug!(collection, applied, watermark, "pull applied");
        Ok(applied)
    }
}
