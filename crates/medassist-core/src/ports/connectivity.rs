//! Connectivity signal shared between the request executor and the
//! connection manager.

use crate::domain::Endpoint;

/// Receives the outcome of real traffic against an endpoint.
///
/// The executor reports here after each logical operation so that the
/// connection state reflects successful generations without waiting for the
/// next health sweep.
pub trait ConnectivitySignal: Send + Sync {
    /// A request to `endpoint` completed successfully.
    fn report_success(&self, endpoint: &Endpoint);

    /// Requests to `endpoint` kept failing with transient errors.
    fn report_failure(&self, endpoint: &Endpoint, error: &str);
}

/// A signal sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSignal;

impl ConnectivitySignal for NoopSignal {
    fn report_success(&self, _endpoint: &Endpoint) {}

    fn report_failure(&self, _endpoint: &Endpoint, _error: &str) {}
}
