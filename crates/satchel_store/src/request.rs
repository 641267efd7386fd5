//! Outbound request model for the remote data interface.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// HTTP-style method of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Fetch data.
    Get,
    /// Create a document.
    Post,
    /// Replace a document.
    Put,
    /// Remove a document.
    Delete,
}

impl Method {
    /// Returns the method name in wire form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Returns true for methods that change remote state.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound call against the remote data interface.
///
/// The client-wins "accept my version regardless" instruction is the
/// tagged `force` flag, not a string baked into the endpoint - remote
/// client implementations translate it however their API expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    /// Method to use.
    pub method: Method,
    /// Target endpoint, e.g. `/templates/tpl-1`.
    pub endpoint: String,
    /// Query parameters, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<(String, String)>,
    /// Extra headers, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    /// Request body for mutating calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Instructs the remote to accept the write regardless of its own
    /// state. Only meaningful for mutating calls.
    #[serde(default)]
    pub force: bool,
}

impl OutboundRequest {
    fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            force: false,
        }
    }

    /// A GET request with query parameters.
    pub fn get(endpoint: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self {
            query,
            ..Self::new(Method::Get, endpoint)
        }
    }

    /// A POST request with a body.
    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Method::Post, endpoint)
        }
    }

    /// A PUT request with a body.
    pub fn put(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Method::Put, endpoint)
        }
    }

    /// A DELETE request.
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    /// Sets the force flag.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
