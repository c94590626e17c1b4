//! Runtime adapters for medassist.
//!
//! - [`OllamaTransport`]: `InferenceTransport` over the Ollama HTTP API
//! - [`EndpointProber`]: bounded-time liveness checks
//! - [`ConnectionManager`]: connectivity state, health sweeps, observers
//! - [`RequestExecutor`]: generate calls with timeouts, retries and backoff
//! - [`MedicalAssistant`]: the service chat frontends talk to

#![deny(unsafe_code)]

pub mod assistant;
pub mod connection;
pub mod executor;
pub mod ollama;
pub mod prober;

#[cfg(test)]
pub(crate) mod testing;

pub use assistant::{ActiveEndpointInfo, MedicalAssistant};
pub use connection::{ConnectionManager, ConnectionSnapshot, StateCallback, Subscription};
pub use executor::{ExecuteOptions, RequestExecutor};
pub use ollama::OllamaTransport;
pub use prober::{EndpointProber, ProbeResult};

