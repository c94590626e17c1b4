//! Bounded-time liveness checks against a single endpoint.

use std::sync::Arc;
use std::time::Duration;

use medassist_core::{Endpoint, InferenceTransport, TransportError};
use tokio::time::timeout;
use tracing::debug;

/// Outcome of one probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResult {
    pub alive: bool,
    /// Models listed by the endpoint. Empty when not alive.
    pub models_available: Vec<String>,
}

impl ProbeResult {
    pub const fn dead() -> Self {
        Self {
            alive: false,
            models_available: Vec::new(),
        }
    }
}

/// Probes endpoints through an [`InferenceTransport`].
#[derive(Clone)]
pub struct EndpointProber {
    transport: Arc<dyn InferenceTransport>,
}

impl EndpointProber {
    pub fn new(transport: Arc<dyn InferenceTransport>) -> Self {
        Self { transport }
    }

    /// Ping the listing path, then confirm the listing is well formed.
    ///
    /// The whole probe is bounded by `deadline`. Never fails: every error and
    /// the timeout itself yield [`ProbeResult::dead`].
    pub async fn probe(&self, endpoint: &Endpoint, deadline: Duration) -> ProbeResult {
        match timeout(deadline, self.check(endpoint)).await {
            Ok(Ok(models)) => {
                debug!(endpoint = %endpoint, models = models.len(), "Probe succeeded");
                ProbeResult {
                    alive: true,
                    models_available: models,
                }
            }
            Ok(Err(e)) => {
                debug!(endpoint = %endpoint, error = %e, "Probe failed");
                ProbeResult::dead()
            }
            Err(_) => {
                debug!(
                    endpoint = %endpoint,
                    timeout_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    "Probe timed out"
                );
                ProbeResult::dead()
            }
        }
    }

    async fn check(&self, endpoint: &Endpoint) -> Result<Vec<String>, TransportError> {
        self.transport.ping(endpoint).await?;
        self.transport.list_models(endpoint).await
    }
}
