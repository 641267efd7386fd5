//! The remote endpoint abstraction and a scripted test double.

use parking_lot::Mutex;
use satchel_store::{Method, OutboundRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Result alias for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failure modes of a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote answered with a non-success status.
    #[error("remote returned status {code}: {message}")]
    Status {
        /// HTTP-style status code.
        code: u16,
        /// Server-provided reason, if any.
        message: String,
    },

    /// The request never reached the remote.
    #[error("network failure: {0}")]
    Network(String),

    /// The request was sent but no answer arrived in time.
    #[error("request timed out")]
    Timeout,
}

impl RemoteError {
    /// A status error with the given code and message.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// The remote holds a version that contradicts ours.
    #[must_use]
    pub fn conflict() -> Self {
        Self::status(409, "conflict")
    }

    /// The remote does not know the resource.
    #[must_use]
    pub fn not_found() -> Self {
        Self::status(404, "not found")
    }

    /// True for a 409 status.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Status { code: 409, .. })
    }

    /// True for a 404 status.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { code: 404, .. })
    }

    /// True for failures worth retrying later: transport problems,
    /// timeouts and server-side errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Status { code, .. } => *code >= 500,
        }
    }
}

/// Synchronous interface to the remote API.
///
/// Implementations are expected to bound each call with the configured
/// request timeout and surface expiry as [`RemoteError::Timeout`]. The
/// engine never retries inside a cycle; a failed call is reported and
/// tried again on the next cycle or replay.
pub trait RemoteClient: Send + Sync {
    /// Executes one request against the remote, returning the decoded
    /// response body.
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures, timeouts, or
    /// non-success statuses.
    fn execute(&self, request: &OutboundRequest) -> RemoteResult<Value>;
}

/// A document as the remote serves it in pull deltas and fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    /// Document id.
    pub id: String,
    /// Document body.
    #[serde(default)]
    pub data: Value,
    /// Server-side modification time, milliseconds since epoch.
    pub updated_at: i64,
}

/// In-memory [`RemoteClient`] scripted per method and endpoint.
///
/// Responses are staged as FIFO queues keyed by `METHOD endpoint`; once
/// a queue is drained (or for anything unstaged) the mock answers
/// `{"ok": true}`. Every executed request is recorded for inspection.
#[derive(Default)]
pub struct MockRemote {
    responses: Mutex<HashMap<String, VecDeque<RemoteResult<Value>>>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl MockRemote {
    /// Creates a mock with no staged responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(method: Method, endpoint: &str) -> String {
        format!("{method} {endpoint}")
    }

    /// Stages the next response for a method and endpoint.
    pub fn stage(&self, method: Method, endpoint: &str, result: RemoteResult<Value>) {
        self.responses
            .lock()
            .entry(Self::key(method, endpoint))
            .or_default()
            .push_back(result);
    }

    /// All requests executed so far, in order.
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().clone()
    }

    /// Requests executed against one method and endpoint, in order.
    pub fn requests_for(&self, method: Method, endpoint: &str) -> Vec<OutboundRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.endpoint == endpoint)
            .cloned()
            .collect()
    }

    /// Total number of executed requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl RemoteClient for MockRemote {
    fn execute(&self, request: &OutboundRequest) -> RemoteResult<Value> {
        self.requests.lock().push(request.clone());
        let key = Self::key(request.method, &request.endpoint);
        if let Some(queue) = self.responses.lock().get_mut(&key) {
            if let Some(result) = queue.pop_front() {
                return result;
            }
        }
        Ok(json!({"ok": true}))
    }
}
