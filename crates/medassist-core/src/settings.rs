//! User settings and validation.
//!
//! Settings are user overrides on top of the resolved platform profile. All
//! fields are optional; `None` means "use the profile / built-in default".

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, RetryPolicy};

/// Model used when nothing is configured and the service lists nothing useful.
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Upper bound for `max_attempts`.
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// User overrides for connection and generation behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    /// Base URL tried before the profile's endpoints.
    pub endpoint: Option<String>,

    /// Replaces the profile's fallback endpoints.
    pub alternative_endpoints: Option<Vec<String>>,

    /// Model to generate with (skips automatic selection).
    pub model: Option<String>,

    /// Per-attempt deadline for generate calls, in milliseconds.
    pub request_timeout_ms: Option<u64>,

    /// Deadline for a single endpoint probe, in milliseconds.
    pub probe_timeout_ms: Option<u64>,

    /// Background sweep period, in milliseconds.
    pub health_check_interval_ms: Option<u64>,

    /// Attempts per generate operation (1-10).
    pub max_attempts: Option<u32>,

    /// Sampling temperature (0.0-2.0).
    pub temperature: Option<f32>,
}

impl AssistantSettings {
    /// Read settings from `MEDASSIST_*` environment variables.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            endpoint: text("MEDASSIST_OLLAMA_URL"),
            alternative_endpoints: text("MEDASSIST_FALLBACK_URLS").map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            }),
            model: text("MEDASSIST_MODEL"),
            request_timeout_ms: parse_var(&text, "MEDASSIST_REQUEST_TIMEOUT_MS"),
            probe_timeout_ms: parse_var(&text, "MEDASSIST_PROBE_TIMEOUT_MS"),
            health_check_interval_ms: parse_var(&text, "MEDASSIST_HEALTH_INTERVAL_MS"),
            max_attempts: parse_var(&text, "MEDASSIST_MAX_ATTEMPTS"),
            temperature: parse_var(&text, "MEDASSIST_TEMPERATURE"),
        }
    }

    /// Merge an update into these settings, only touching fields that are Some.
    pub fn merge(&mut self, other: &SettingsUpdate) {
        if let Some(ref endpoint) = other.endpoint {
            self.endpoint.clone_from(endpoint);
        }
        if let Some(ref alternatives) = other.alternative_endpoints {
            self.alternative_endpoints.clone_from(alternatives);
        }
        if let Some(ref model) = other.model {
            self.model.clone_from(model);
        }
        if let Some(ms) = other.request_timeout_ms {
            self.request_timeout_ms = ms;
        }
        if let Some(ms) = other.probe_timeout_ms {
            self.probe_timeout_ms = ms;
        }
        if let Some(ms) = other.health_check_interval_ms {
            self.health_check_interval_ms = ms;
        }
        if let Some(attempts) = other.max_attempts {
            self.max_attempts = attempts;
        }
        if let Some(temperature) = other.temperature {
            self.temperature = temperature;
        }
    }

    /// Retry policy with the configured attempt budget.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            DEFAULT_BASE_DELAY,
        )
    }
}

fn parse_var<T, F>(text: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = text(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

/// Partial settings update.
///
/// Each field is `Option<Option<T>>`:
/// - `None` = don't change this field
/// - `Some(None)` = reset the field to its default
/// - `Some(Some(value))` = set field to value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub endpoint: Option<Option<String>>,
    pub alternative_endpoints: Option<Option<Vec<String>>>,
    pub model: Option<Option<String>>,
    pub request_timeout_ms: Option<Option<u64>>,
    pub probe_timeout_ms: Option<Option<u64>>,
    pub health_check_interval_ms: Option<Option<u64>>,
    pub max_attempts: Option<Option<u32>>,
    pub temperature: Option<Option<f32>>,
}

/// Settings validation error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SettingsError {
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("Max attempts must be between 1 and 10, got {0}")]
    InvalidAttempts(u32),

    #[error("Temperature must be between 0.0 and 2.0, got {0}")]
    InvalidTemperature(f32),

    #[error("Model name cannot be empty")]
    EmptyModel,
}

fn validate_endpoint(url: &str) -> Result<(), SettingsError> {
    let invalid = |reason: String| SettingsError::InvalidEndpoint {
        url: url.to_string(),
        reason,
    };

    let parsed = url::Url::parse(url.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

/// Validate settings values.
pub fn validate_settings(settings: &AssistantSettings) -> Result<(), SettingsError> {
    if let Some(ref url) = settings.endpoint {
        validate_endpoint(url)?;
    }
    for url in settings.alternative_endpoints.iter().flatten() {
        validate_endpoint(url)?;
    }

    for (field, value) in [
        ("Request timeout", settings.request_timeout_ms),
        ("Probe timeout", settings.probe_timeout_ms),
        ("Health check interval", settings.health_check_interval_ms),
    ] {
        if value == Some(0) {
            return Err(SettingsError::ZeroDuration { field });
        }
    }

    if let Some(attempts) = settings.max_attempts {
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&attempts) {
            return Err(SettingsError::InvalidAttempts(attempts));
        }
    }

    if let Some(temperature) = settings.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(SettingsError::InvalidTemperature(temperature));
        }
    }

    if settings
        .model
        .as_ref()
        .is_some_and(|m| m.trim().is_empty())
    {
        return Err(SettingsError::EmptyModel);
    }

    Ok(())
}
