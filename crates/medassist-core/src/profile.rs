//! Platform profile resolution.
//!
//! Maps a description of the host to the ordered list of loopback endpoints
//! at which the local inference service is tried, plus the timing parameters
//! used to reach it. Resolution is a pure function of its input.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Endpoint;
use crate::settings::AssistantSettings;

/// Default port of the Ollama service.
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Operating system family, as far as endpoint quirks are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
    Unknown,
}

impl OsFamily {
    /// Detect the family from a user-agent-like string or an OS name.
    ///
    /// Apple platforms are checked first because "darwin" contains "win".
    pub fn detect(descriptor: &str) -> Self {
        let lower = descriptor.to_ascii_lowercase();
        if lower.contains("mac") || lower.contains("darwin") || lower.contains("ios") {
            Self::MacOs
        } else if lower.contains("win") {
            Self::Windows
        } else if lower.contains("linux") || lower.contains("x11") || lower.contains("bsd") {
            Self::Linux
        } else {
            Self::Unknown
        }
    }
}

/// Opaque description of the current host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDescriptor {
    raw: String,
}

impl HostDescriptor {
    /// Wrap a descriptor string (e.g. a user agent).
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Describe the host this binary was compiled for.
    pub fn current() -> Self {
        Self::new(std::env::consts::OS)
    }

    /// The raw descriptor text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The detected OS family.
    pub fn os_family(&self) -> OsFamily {
        OsFamily::detect(&self.raw)
    }
}

/// Where and how to reach the local inference service.
///
/// Read-only for the lifetime of the process. Overrides produce a new value
/// through [`PlatformProfile::with_overrides`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub os_family: OsFamily,
    pub base_endpoint: Endpoint,
    /// Fallbacks, tried in order after `base_endpoint`.
    pub alternative_endpoints: Vec<Endpoint>,
    /// Deadline for one generate attempt.
    pub request_timeout_ms: u64,
    /// Deadline for one endpoint probe.
    pub probe_timeout_ms: u64,
    /// Period of the background health sweep.
    pub health_check_interval_ms: u64,
}

struct Timing {
    request_timeout_ms: u64,
    probe_timeout_ms: u64,
    health_check_interval_ms: u64,
}

const STANDARD_TIMING: Timing = Timing {
    request_timeout_ms: 120_000,
    probe_timeout_ms: 5_000,
    health_check_interval_ms: 30_000,
};

// The service starts noticeably slower on Windows (antivirus scans, GPU
// driver init), so everything gets more headroom there.
const SLOW_START_TIMING: Timing = Timing {
    request_timeout_ms: 180_000,
    probe_timeout_ms: 8_000,
    health_check_interval_ms: 45_000,
};

// `localhost` may resolve to ::1 first or go through a slow resolver
const NUMERIC_FIRST_HOSTS: &[&str] = &["127.0.0.1", "localhost", "[::1]"];
const HOSTNAME_FIRST_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];
const DEFAULT_HOSTS: &[&str] = &["127.0.0.1", "localhost"];

fn loopback(host: &str) -> Endpoint {
    Endpoint::new(format!("http://{host}:{DEFAULT_OLLAMA_PORT}"))
}

/// Resolve the profile for a host.
///
/// Never fails: unrecognized hosts get a numeric-loopback-first default list.
pub fn resolve_profile(host: &HostDescriptor) -> PlatformProfile {
    let os_family = host.os_family();

    let (hosts, timing) = match os_family {
        OsFamily::Windows => (NUMERIC_FIRST_HOSTS, SLOW_START_TIMING),
        OsFamily::MacOs => (HOSTNAME_FIRST_HOSTS, STANDARD_TIMING),
        OsFamily::Linux => (NUMERIC_FIRST_HOSTS, STANDARD_TIMING),
        OsFamily::Unknown => (DEFAULT_HOSTS, STANDARD_TIMING),
    };

    let mut endpoints = hosts.iter().map(|h| loopback(h));
    // hosts is never empty
    let base_endpoint = endpoints
        .next()
        .unwrap_or_else(|| loopback("127.0.0.1"));

    PlatformProfile {
        os_family,
        base_endpoint,
        alternative_endpoints: endpoints.collect(),
        request_timeout_ms: timing.request_timeout_ms,
        probe_timeout_ms: timing.probe_timeout_ms,
        health_check_interval_ms: timing.health_check_interval_ms,
    }
}

impl PlatformProfile {
    /// All candidate endpoints in priority order, without duplicates.
    pub fn candidates(&self) -> Vec<Endpoint> {
        let mut out: Vec<Endpoint> = Vec::with_capacity(1 + self.alternative_endpoints.len());
        for ep in std::iter::once(&self.base_endpoint).chain(&self.alternative_endpoints) {
            if !out.contains(ep) {
                out.push(ep.clone());
            }
        }
        out
    }

    /// Whether `endpoint` is one of this profile's candidates.
    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        &self.base_endpoint == endpoint || self.alternative_endpoints.contains(endpoint)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Apply user overrides, producing a new profile.
    ///
    /// An overridden base endpoint goes first; the resolved endpoints stay
    /// behind it as fallbacks unless `alternative_endpoints` is overridden too.
    #[must_use]
    pub fn with_overrides(&self, settings: &AssistantSettings) -> Self {
        let mut profile = self.clone();

        if let Some(ref alternatives) = settings.alternative_endpoints {
            profile.alternative_endpoints = alternatives.iter().map(Endpoint::new).collect();
        }

        if let Some(ref url) = settings.endpoint {
            let base = Endpoint::new(url.as_str());
            if base != profile.base_endpoint {
                let previous = std::mem::replace(&mut profile.base_endpoint, base);
                if settings.alternative_endpoints.is_none() {
                    profile.alternative_endpoints.insert(0, previous);
                }
            }
            let base = profile.base_endpoint.clone();
            profile.alternative_endpoints.retain(|ep| *ep != base);
        }

        // Zero durations are rejected by `validate_settings`; ignore them here
        // for callers that skip validation.
        let non_zero = |value: Option<u64>| value.filter(|ms| *ms > 0);
        if let Some(ms) = non_zero(settings.request_timeout_ms) {
            profile.request_timeout_ms = ms;
        }
        if let Some(ms) = non_zero(settings.probe_timeout_ms) {
            profile.probe_timeout_ms = ms;
        }
        if let Some(ms) = non_zero(settings.health_check_interval_ms) {
            profile.health_check_interval_ms = ms;
        }

        profile
    }
}
