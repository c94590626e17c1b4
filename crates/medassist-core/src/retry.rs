//! Retry policy for generate calls.
//!
//! Pure decision logic: how many attempts, which failures are worth another
//! attempt, and how long to wait in between. The executor owns the loop; this
//! type owns the rules, so they can be tested without any I/O.

use std::time::Duration;

use crate::ports::TransportError;

/// Default number of attempts per logical operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Wait after the first failed attempt; doubles after each further failure.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Whether a failure may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    /// Transient, network-layer failure.
    Retryable,
    /// The service answered and said no; retrying cannot help.
    Fatal,
}

/// Attempt budget plus exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    /// Create a policy. At least one attempt is always made.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            base_delay,
        }
    }

    /// Same backoff, different attempt budget.
    #[must_use]
    pub const fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self::new(max_attempts, self.base_delay)
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Classify a transport failure.
    ///
    /// Refused/reset connections, DNS failures, generic network errors and
    /// timeouts are retryable, as are 5xx responses without a structured body.
    /// A structured `{ error }` response, any other non-success status and a
    /// malformed success body are fatal.
    pub const fn classify(&self, error: &TransportError) -> Retryability {
        match error {
            TransportError::ConnectionRefused(_)
            | TransportError::NameResolution(_)
            | TransportError::ConnectionReset(_)
            | TransportError::Network(_)
            | TransportError::Timeout { .. } => Retryability::Retryable,
            TransportError::HttpStatus { status, .. } if *status >= 500 => Retryability::Retryable,
            TransportError::Service { .. }
            | TransportError::HttpStatus { .. }
            | TransportError::InvalidResponse(_) => Retryability::Fatal,
        }
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based).
    ///
    /// `2^(attempt-1)` times the base delay: 1s, 2s, 4s, ... with the default.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether to try again after `attempt` failed with `error`.
    pub const fn should_retry(&self, attempt: u32, error: &TransportError) -> bool {
        attempt < self.max_attempts && matches!(self.classify(error), Retryability::Retryable)
    }
}
