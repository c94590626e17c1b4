//! Generation request and result types.
//!
//! `GenerationRequest` is built per user query by the formatter and discarded
//! once the call settles. `context_tokens` on the result is opaque model state:
//! it may be threaded into the next request, but only for the same model.

use serde::{Deserialize, Serialize};

/// One non-streaming generate call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// User-facing prompt text.
    pub prompt: String,
    /// System instruction sent alongside the prompt.
    pub system_instruction: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate (`num_predict` on the wire).
    pub max_tokens: Option<u32>,
    /// Context returned by a previous call to the same model.
    pub prior_context_tokens: Option<Vec<i64>>,
}

impl GenerationRequest {
    /// Create a request with only a prompt and temperature.
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            temperature,
            max_tokens: None,
            prior_context_tokens: None,
        }
    }

    /// Set the system instruction.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_instruction = Some(system.into());
        self
    }

    /// Set the token limit.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Thread context tokens from an earlier result.
    #[must_use]
    pub fn with_context(mut self, context: Option<Vec<i64>>) -> Self {
        self.prior_context_tokens = context;
        self
    }
}

/// What a transport hands back for a successful generate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawGeneration {
    /// Generated text.
    pub text: String,
    /// Opaque context for the next turn.
    pub context_tokens: Option<Vec<i64>>,
    /// Model that produced the text, as reported by the service.
    pub model_name: String,
    /// Server-side duration in nanoseconds, if reported.
    pub total_duration_ns: Option<u64>,
    /// Number of generated tokens, if reported.
    pub eval_count: Option<u64>,
}

/// Result of a logical generate operation, after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub context_tokens: Option<Vec<i64>>,
    pub model_name: String,
    /// Wall-clock time of the whole operation, including retries.
    pub elapsed_ms: u64,
}

impl GenerationResult {
    /// Build a result from a transport reply and the measured elapsed time.
    pub fn from_raw(raw: RawGeneration, elapsed_ms: u64) -> Self {
        Self {
            text: raw.text,
            context_tokens: raw.context_tokens,
            model_name: raw.model_name,
            elapsed_ms,
        }
    }
}
