//! Engine configuration.

use crate::resolver::ConflictStrategy;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Tunable parameters for a [`crate::SyncEngine`].
///
/// Built with `with_*` setters:
///
/// ```
/// use satchel_engine::{ConflictStrategy, SyncConfig};
/// use std::time::Duration;
///
/// let config = SyncConfig::new(vec!["notes".into(), "templates".into()])
///     .with_strategy(ConflictStrategy::ServerWins)
///     .with_sync_interval(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Collections pulled from the remote each cycle.
    pub collections: Vec<String>,
    /// Conflict resolution strategy for rejected pushes.
    pub strategy: ConflictStrategy,
    /// Periodic sync interval. Zero disables the timer; cycles then run
    /// only on demand and on reconnect.
    pub sync_interval: Duration,
    /// Upper bound a remote client should place on one request.
    pub request_timeout: Duration,
    /// How long synced change log entries are kept before pruning.
    pub retention: Duration,
}

impl SyncConfig {
    /// A config for the given collections with defaults: last-write-wins
    /// conflicts, no periodic timer, 30s request timeout and a 7 day
    /// change log retention.
    #[must_use]
    pub fn new(collections: Vec<String>) -> Self {
        Self {
            collections,
            strategy: ConflictStrategy::default(),
            sync_interval: Duration::ZERO,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Sets the conflict strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the periodic sync interval.
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the per-request timeout hint.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the change log retention window.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
