//! Scripted fake transport for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use medassist_core::{Endpoint, GenerationRequest, InferenceTransport, RawGeneration, TransportError};

/// Canned outcome for one generate call.
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// Succeed with this text.
    Text(String),
    /// Succeed with a full raw generation.
    Raw(RawGeneration),
    /// Fail with this error.
    Fail(TransportError),
    /// Never settle.
    Hang,
}

/// A generate call as seen by the fake.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub endpoint: Endpoint,
    pub model: String,
    pub request: GenerationRequest,
}

#[derive(Debug, Clone, Default)]
struct EndpointScript {
    /// `Some` means the endpoint answers.
    models: Option<Vec<String>>,
    listing_error: Option<TransportError>,
    hanging: bool,
}

pub const DEFAULT_FAKE_TEXT: &str =
    "Staying hydrated and resting are common first steps. Consult your doctor if it persists.";

/// In-memory transport with per-endpoint liveness and a queue of generate replies.
///
/// Unknown endpoints refuse connections. When the reply queue is empty,
/// generate succeeds with [`DEFAULT_FAKE_TEXT`].
#[derive(Default)]
pub struct FakeTransport {
    endpoints: Mutex<HashMap<Endpoint, EndpointScript>>,
    replies: Mutex<VecDeque<FakeReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    pings: Mutex<Vec<Endpoint>>,
    pulls: Mutex<Vec<String>>,
    pull_error: Mutex<Option<TransportError>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alive(self, endpoint: &Endpoint, models: &[&str]) -> Self {
        self.set_alive(endpoint, models);
        self
    }

    pub fn with_replies(self, replies: impl IntoIterator<Item = FakeReply>) -> Self {
        self.replies.lock().unwrap().extend(replies);
        self
    }

    pub fn set_alive(&self, endpoint: &Endpoint, models: &[&str]) {
        let mut endpoints = self.endpoints.lock().unwrap();
        let script = endpoints.entry(endpoint.clone()).or_default();
        script.models = Some(models.iter().map(|m| (*m).to_string()).collect());
        script.hanging = false;
    }

    pub fn set_dead(&self, endpoint: &Endpoint) {
        self.endpoints.lock().unwrap().remove(endpoint);
    }

    pub fn set_hanging(&self, endpoint: &Endpoint) {
        self.endpoints
            .lock()
            .unwrap()
            .entry(endpoint.clone())
            .or_default()
            .hanging = true;
    }

    pub fn set_listing_error(&self, endpoint: &Endpoint, error: TransportError) {
        self.endpoints
            .lock()
            .unwrap()
            .entry(endpoint.clone())
            .or_default()
            .listing_error = Some(error);
    }

    pub fn push_reply(&self, reply: FakeReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn generate_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Endpoints pinged so far, in order.
    pub fn pings(&self) -> Vec<Endpoint> {
        self.pings.lock().unwrap().clone()
    }

    pub fn clear_pings(&self) {
        self.pings.lock().unwrap().clear();
    }

    /// Models pulled so far, in order.
    pub fn pulls(&self) -> Vec<String> {
        self.pulls.lock().unwrap().clone()
    }

    /// Make every following pull fail with `error`.
    pub fn set_pull_error(&self, error: TransportError) {
        *self.pull_error.lock().unwrap() = Some(error);
    }

    fn script(&self, endpoint: &Endpoint) -> EndpointScript {
        self.endpoints
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_default()
    }
}

fn refused(endpoint: &Endpoint) -> TransportError {
    TransportError::ConnectionRefused(format!("{endpoint}: connection refused"))
}

#[async_trait]
impl InferenceTransport for FakeTransport {
    async fn ping(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
        self.pings.lock().unwrap().push(endpoint.clone());
        let script = self.script(endpoint);
        if script.hanging {
            return std::future::pending().await;
        }
        script.models.map(|_| ()).ok_or_else(|| refused(endpoint))
    }

    async fn list_models(&self, endpoint: &Endpoint) -> Result<Vec<String>, TransportError> {
        let script = self.script(endpoint);
        if script.hanging {
            return std::future::pending().await;
        }
        if let Some(error) = script.listing_error {
            return Err(error);
        }
        script.models.ok_or_else(|| refused(endpoint))
    }

    async fn pull_model(&self, endpoint: &Endpoint, model: &str) -> Result<(), TransportError> {
        self.pulls.lock().unwrap().push(model.to_string());
        if let Some(error) = self.pull_error.lock().unwrap().clone() {
            return Err(error);
        }

        let mut endpoints = self.endpoints.lock().unwrap();
        let models = endpoints
            .get_mut(endpoint)
            .and_then(|script| script.models.as_mut())
            .ok_or_else(|| refused(endpoint))?;
        if !models.iter().any(|m| m == model) {
            models.push(model.to_string());
        }
        Ok(())
    }

    async fn generate(
        &self,
        endpoint: &Endpoint,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<RawGeneration, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            endpoint: endpoint.clone(),
            model: model.to_string(),
            request: request.clone(),
        });

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| FakeReply::Text(DEFAULT_FAKE_TEXT.to_string()));

        match reply {
            FakeReply::Text(text) => Ok(RawGeneration {
                text,
                context_tokens: Some(vec![1, 2, 3]),
                model_name: model.to_string(),
                total_duration_ns: None,
                eval_count: None,
            }),
            FakeReply::Raw(raw) => Ok(raw),
            FakeReply::Fail(error) => Err(error),
            FakeReply::Hang => std::future::pending().await,
        }
    }
}
