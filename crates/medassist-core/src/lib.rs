//! Core domain types, ports and pure policies for medassist.
//!
//! This crate has no network or runtime dependencies. It defines:
//!
//! - the domain model shared by every adapter (`Endpoint`, `ConnectionState`,
//!   `GenerationRequest`, `MedicalResponse`, ...)
//! - the ports the runtime implements (`InferenceTransport`, `ConnectivitySignal`)
//! - the platform profile resolver, the retry policy and the medical formatter,
//!   all of which are pure and testable without I/O
//! - user settings and their validation

pub mod domain;
pub mod error;
pub mod formatter;
pub mod ports;
pub mod profile;
pub mod retry;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    ConnectionState, Endpoint, GenerationRequest, GenerationResult, MedicalGuidance,
    MedicalResponse, PREFERRED_MODELS, RawGeneration, Severity, select_model,
};
pub use error::{ErrorKind, ExecutionError};
pub use formatter::{
    DISCLAIMER, EMERGENCY_KEYWORDS, FALLBACK_RESPONSE, MEDICAL_SYSTEM_INSTRUCTION,
    MIN_READABLE_LENGTH, MedicalFormatter, detect_emergency,
};
pub use ports::{ConnectivitySignal, InferenceTransport, NoopSignal, TransportError};
pub use profile::{
    DEFAULT_OLLAMA_PORT, HostDescriptor, OsFamily, PlatformProfile, resolve_profile,
};
pub use retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, RetryPolicy, Retryability};
pub use settings::{
    AssistantSettings, DEFAULT_MODEL, SettingsError, SettingsUpdate, validate_settings,
};
