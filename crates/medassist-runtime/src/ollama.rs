//! Ollama HTTP transport.
//!
//! Speaks the non-streaming subset of the Ollama API:
//!
//! - `GET  {endpoint}/api/tags`     - model listing (also used as liveness check)
//! - `POST {endpoint}/api/generate` - one completion with `stream: false`
//! - `POST {endpoint}/api/pull`     - model download with `stream: false`
//!
//! Failures are mapped onto [`TransportError`] so the retry policy can
//! classify them without seeing reqwest types.

use std::error::Error as StdError;
use std::io;

use async_trait::async_trait;
use medassist_core::{Endpoint, GenerationRequest, InferenceTransport, RawGeneration, TransportError};
use serde::{Deserialize, Serialize};
use tracing::debug;

const TAGS_PATH: &str = "/api/tags";
const GENERATE_PATH: &str = "/api/generate";
const PULL_PATH: &str = "/api/pull";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a [i64]>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl<'a> GenerateBody<'a> {
    fn new(model: &'a str, request: &'a GenerationRequest) -> Self {
        Self {
            model,
            prompt: &request.prompt,
            system: request.system_instruction.as_deref(),
            context: request.prior_context_tokens.as_deref(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    model: Option<String>,
    response: String,
    #[serde(default)]
    context: Option<Vec<i64>>,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    done: bool,
}

/// Structured error body (`{ "error": "..." }`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct PullBody<'a> {
    name: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullReply {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

// ============================================================================
// Transport
// ============================================================================

/// [`InferenceTransport`] over the Ollama HTTP API.
///
/// The client carries no timeout of its own; deadlines are enforced by the
/// prober and the executor around each call.
#[derive(Debug, Clone, Default)]
pub struct OllamaTransport {
    client: reqwest::Client,
}

impl OllamaTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxy settings, custom TLS, ...).
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_tags(&self, endpoint: &Endpoint) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .get(endpoint.url_for(TAGS_PATH))
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(read_error(response).await)
        }
    }
}

#[async_trait]
impl InferenceTransport for OllamaTransport {
    async fn ping(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
        self.get_tags(endpoint).await.map(|_| ())
    }

    async fn list_models(&self, endpoint: &Endpoint) -> Result<Vec<String>, TransportError> {
        let body = self
            .get_tags(endpoint)
            .await?
            .text()
            .await
            .map_err(|e| map_reqwest_error(&e))?;

        parse_tags(&body)
    }

    async fn generate(
        &self,
        endpoint: &Endpoint,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<RawGeneration, TransportError> {
        debug!(endpoint = %endpoint, model, "POST /api/generate");

        let response = self
            .client
            .post(endpoint.url_for(GENERATE_PATH))
            .json(&GenerateBody::new(model, request))
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(read_error(response).await);
        }

        let body = response.text().await.map_err(|e| map_reqwest_error(&e))?;
        parse_generate(status, &body, model)
    }

    async fn pull_model(&self, endpoint: &Endpoint, model: &str) -> Result<(), TransportError> {
        debug!(endpoint = %endpoint, model, "POST /api/pull");

        let response = self
            .client
            .post(endpoint.url_for(PULL_PATH))
            .json(&PullBody {
                name: model,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(read_error(response).await);
        }

        let body = response.text().await.map_err(|e| map_reqwest_error(&e))?;
        parse_pull(status, &body)
    }
}

fn parse_tags(body: &str) -> Result<Vec<String>, TransportError> {
    let tags: TagsResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponse(format!("model listing: {e}")))?;
    Ok(tags.models.into_iter().map(|m| m.name).collect())
}

fn parse_generate(status: u16, body: &str, model: &str) -> Result<RawGeneration, TransportError> {
    // Ollama occasionally reports errors with a 200 status
    if let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(body) {
        return Err(TransportError::Service {
            status,
            message: error,
        });
    }

    let reply: GenerateReply = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponse(format!("generate reply: {e}")))?;

    Ok(RawGeneration {
        text: reply.response,
        context_tokens: reply.context,
        model_name: reply.model.unwrap_or_else(|| model.to_string()),
        total_duration_ns: reply.total_duration,
        eval_count: reply.eval_count,
    })
}

fn parse_pull(status: u16, body: &str) -> Result<(), TransportError> {
    if let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(body) {
        return Err(TransportError::Service {
            status,
            message: error,
        });
    }

    let reply: PullReply = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponse(format!("pull reply: {e}")))?;
    match reply.status.as_deref() {
        Some("success") => Ok(()),
        other => Err(TransportError::InvalidResponse(format!(
            "pull finished with status {other:?}"
        ))),
    }
}

/// Turn a non-success response into `Service` (structured body) or `HttpStatus`.
async fn read_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    error_from_body(status, body)
}

fn error_from_body(status: u16, body: String) -> TransportError {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody { error }) => TransportError::Service {
            status,
            message: error,
        },
        Err(_) => TransportError::HttpStatus { status, body },
    }
}

/// Classify a reqwest failure by walking its source chain.
fn map_reqwest_error(err: &reqwest::Error) -> TransportError {
    let message = err.to_string();

    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => {
                    return TransportError::ConnectionRefused(message);
                }
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => {
                    return TransportError::ConnectionReset(message);
                }
                _ => {}
            }
        }

        let text = current.to_string().to_ascii_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return TransportError::NameResolution(message);
        }

        source = current.source();
    }

    TransportError::Network(message)
}
