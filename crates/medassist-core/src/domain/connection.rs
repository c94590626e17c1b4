//! Endpoint and connection state types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Base address of one candidate inference service (e.g. `http://127.0.0.1:11434`).
///
/// Endpoints are immutable values compared by string equality. A trailing
/// slash is dropped on construction so `http://localhost:11434/` and
/// `http://localhost:11434` are the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Create an endpoint from a base URL.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let trimmed = url.trim().trim_end_matches('/');
        Self(trimmed.to_string())
    }

    /// The endpoint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the full URL for an API path on this endpoint.
    ///
    /// ```rust
    /// use medassist_core::Endpoint;
    ///
    /// let ep = Endpoint::new("http://127.0.0.1:11434/");
    /// assert_eq!(ep.url_for("/api/tags"), "http://127.0.0.1:11434/api/tags");
    /// ```
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Connectivity state owned by the connection manager.
///
/// `active_endpoint` survives a disconnect: it is the last endpoint that
/// answered, and it is probed first on the next sweep. `connected` is only
/// ever true while `active_endpoint` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Whether the inference service is currently reachable.
    pub connected: bool,
    /// The endpoint in use, or the last one that answered.
    pub active_endpoint: Option<Endpoint>,
}

impl ConnectionState {
    /// Initial state: nothing has been found yet.
    #[must_use]
    pub const fn disconnected() -> Self {
        Self {
            connected: false,
            active_endpoint: None,
        }
    }

    /// Connected through `endpoint`.
    #[must_use]
    pub const fn connected_to(endpoint: Endpoint) -> Self {
        Self {
            connected: true,
            active_endpoint: Some(endpoint),
        }
    }

    /// Same active endpoint, no longer reachable.
    #[must_use]
    pub fn lost(self) -> Self {
        Self {
            connected: false,
            active_endpoint: self.active_endpoint,
        }
    }

    /// Whether any endpoint has ever been found alive.
    pub const fn is_initialized(&self) -> bool {
        self.active_endpoint.is_some()
    }
}
