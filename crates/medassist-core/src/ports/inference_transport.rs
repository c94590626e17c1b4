//! Inference transport trait definition.
//!
//! This port is the only way the runtime talks to the local inference
//! service. The production implementation speaks the Ollama HTTP API;
//! tests script it with fakes.

use async_trait::async_trait;

use super::TransportError;
use crate::domain::{Endpoint, GenerationRequest, RawGeneration};

/// Calls against one inference service endpoint.
///
/// Implementations perform exactly one network exchange per method call.
/// They do not retry and do not enforce deadlines; callers wrap calls in
/// their own timeouts, and dropping the returned future aborts the call.
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    /// Lightweight liveness request against the model listing path.
    ///
    /// Succeeds when the endpoint answered with a success status.
    async fn ping(&self, endpoint: &Endpoint) -> Result<(), TransportError>;

    /// Fetch the model listing.
    ///
    /// Returns `InvalidResponse` if the body has no `models` sequence.
    async fn list_models(&self, endpoint: &Endpoint) -> Result<Vec<String>, TransportError>;

    /// Download `model` onto the service and wait until it is installed.
    ///
    /// This can take minutes; callers bound it with their own deadline.
    async fn pull_model(&self, endpoint: &Endpoint, model: &str) -> Result<(), TransportError>;

    /// Run one non-streaming generation with `model`.
    async fn generate(
        &self,
        endpoint: &Endpoint,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<RawGeneration, TransportError>;
}
