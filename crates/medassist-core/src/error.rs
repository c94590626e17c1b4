//! Errors surfaced to callers of a generate operation.

use thiserror::Error;

use crate::ports::TransportError;

/// Failure category of an [`ExecutionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Network,
    Unretryable,
    ExhaustedRetries,
    NotInitialized,
}

/// Why a generate operation failed.
///
/// `Timeout` and `Network` describe a single failed attempt; callers of the
/// executor see them wrapped in `ExhaustedRetries` once the attempt budget is
/// spent. `Unretryable` is returned after the first attempt that hits it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Timeout: no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Network error: {message}")]
    Network { message: String },

    /// The service rejected the request. `message` is the service's own text.
    #[error("Request rejected by the inference service: {message}")]
    Unretryable {
        status: Option<u16>,
        message: String,
    },

    #[error("Exhausted retries after {attempts} attempts; last error: {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        last_error: Box<ExecutionError>,
    },

    #[error("Not initialized: no inference service has been found yet")]
    NotInitialized,
}

impl ExecutionError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Network { .. } => ErrorKind::Network,
            Self::Unretryable { .. } => ErrorKind::Unretryable,
            Self::ExhaustedRetries { .. } => ErrorKind::ExhaustedRetries,
            Self::NotInitialized => ErrorKind::NotInitialized,
        }
    }

    /// Number of attempts made, when known.
    pub const fn attempts(&self) -> Option<u32> {
        match self {
            Self::ExhaustedRetries { attempts, .. } => Some(*attempts),
            Self::Unretryable { .. } | Self::Timeout { .. } | Self::Network { .. } => Some(1),
            Self::NotInitialized => None,
        }
    }

    /// The innermost per-attempt error.
    pub fn root(&self) -> &Self {
        match self {
            Self::ExhaustedRetries { last_error, .. } => last_error.root(),
            other => other,
        }
    }

    /// Guidance text the chat UI shows under the inline error.
    pub const fn guidance(&self) -> &'static str {
        match self {
            Self::NotInitialized | Self::Network { .. } | Self::ExhaustedRetries { .. } => {
                "Make sure the local AI service is running (for example with `ollama serve`) and try again."
            }
            Self::Timeout { .. } => {
                "The model is taking too long to answer. It may still be loading; try again in a moment."
            }
            Self::Unretryable { .. } => {
                "The AI service rejected the request. Check that the selected model is installed (for example with `ollama pull`)."
            }
        }
    }
}

impl From<TransportError> for ExecutionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            TransportError::Service { status, message } => Self::Unretryable {
                status: Some(status),
                message,
            },
            TransportError::HttpStatus { status, body } if status < 500 => Self::Unretryable {
                status: Some(status),
                message: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                },
            },
            TransportError::InvalidResponse(message) => Self::Unretryable {
                status: None,
                message,
            },
            other => Self::Network {
                message: other.to_string(),
            },
        }
    }
}
