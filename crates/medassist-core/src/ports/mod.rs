//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No `reqwest` or HTTP types in any signature
//! - Transport failures are reported as data (`TransportError`), never panics
//! - Retry decisions are made by `RetryPolicy`, not by transports

pub mod connectivity;
pub mod inference_transport;

use thiserror::Error;

pub use connectivity::{ConnectivitySignal, NoopSignal};
pub use inference_transport::InferenceTransport;

/// Failure of a single call to the inference service.
///
/// Transports map their client errors onto these variants so that
/// `RetryPolicy::classify` can decide retryability without knowing the
/// underlying HTTP stack.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing is listening at the endpoint.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The endpoint's host name could not be resolved.
    #[error("Name resolution failed: {0}")]
    NameResolution(String),

    /// The peer dropped the connection mid-request.
    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    /// Any other network-layer failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The call did not settle within its deadline and was aborted.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// The service answered with a structured `{ "error": ... }` body.
    ///
    /// `message` is the service's text, unmodified.
    #[error("{message}")]
    Service {
        /// HTTP status code
        status: u16,
        /// Error message from the service
        message: String,
    },

    /// Non-success status without a structured error body.
    #[error("Unexpected status {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Raw response body (possibly empty)
        body: String,
    },

    /// A success response whose body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_displays_message_verbatim() {
        let err = TransportError::Service {
            status: 404,
            message: "model 'nope' not found, try pulling it first".to_string(),
        };
        assert_eq!(err.to_string(), "model 'nope' not found, try pulling it first");
    }

    #[test]
    fn test_timeout_display_names_deadline() {
        let err = TransportError::Timeout { timeout_ms: 1500 };
        assert_eq!(err.to_string(), "Request timed out after 1500ms");
    }
}
