//! Request executor: one logical generate operation with timeouts and retries.

use std::sync::Arc;
use std::time::Duration;

use medassist_core::{
    ConnectivitySignal, Endpoint, ExecutionError, GenerationRequest, GenerationResult,
    InferenceTransport, RetryPolicy, Retryability, TransportError,
};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

/// Deadline and retry budget for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Deadline for each attempt.
    pub timeout: Duration,
    pub policy: RetryPolicy,
}

impl ExecuteOptions {
    pub const fn new(timeout: Duration, policy: RetryPolicy) -> Self {
        Self { timeout, policy }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Issues generate calls and retries transient failures with backoff.
pub struct RequestExecutor {
    transport: Arc<dyn InferenceTransport>,
    signal: Arc<dyn ConnectivitySignal>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn InferenceTransport>, signal: Arc<dyn ConnectivitySignal>) -> Self {
        Self { transport, signal }
    }

    /// Run `request` against `endpoint`.
    ///
    /// Each attempt is bounded by `options.timeout`; an attempt that runs over
    /// is dropped and counts as a retryable timeout. Fatal failures return
    /// after the attempt that hit them. Once the budget is spent the last
    /// failure is wrapped in [`ExecutionError::ExhaustedRetries`].
    ///
    /// `elapsed_ms` on the result covers the whole operation, backoff included.
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        model: &str,
        request: &GenerationRequest,
        options: ExecuteOptions,
    ) -> Result<GenerationResult, ExecutionError> {
        let policy = options.policy;
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(endpoint = %endpoint, model, attempt, "Sending generate request");

            let outcome = timeout(
                options.timeout,
                self.transport.generate(endpoint, model, request),
            )
            .await
            .unwrap_or(Err(TransportError::Timeout {
                timeout_ms: millis(options.timeout),
            }));

            let err = match outcome {
                Ok(raw) => {
                    let elapsed_ms = millis(started.elapsed());
                    debug!(endpoint = %endpoint, attempt, elapsed_ms, "Generate request succeeded");
                    self.signal.report_success(endpoint);
                    return Ok(GenerationResult::from_raw(raw, elapsed_ms));
                }
                Err(err) => err,
            };

            if policy.classify(&err) == Retryability::Fatal {
                warn!(endpoint = %endpoint, attempt, error = %err, "Generate request rejected");
                return Err(err.into());
            }

            if !policy.should_retry(attempt, &err) {
                warn!(endpoint = %endpoint, attempts = attempt, error = %err, "Giving up on generate request");
                self.signal.report_failure(endpoint, &err.to_string());
                return Err(ExecutionError::ExhaustedRetries {
                    attempts: attempt,
                    last_error: Box::new(err.into()),
                });
            }

            let delay = policy.delay_after(attempt);
            warn!(
                endpoint = %endpoint,
                attempt,
                delay_ms = millis(delay),
                error = %err,
                "Generate attempt failed, retrying"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeReply, FakeTransport};
    use medassist_core::{DEFAULT_BASE_DELAY, ErrorKind, NoopSignal};
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        pub Signal {}
        impl ConnectivitySignal for Signal {
            fn report_success(&self, endpoint: &Endpoint);
            fn report_failure(&self, endpoint: &Endpoint, error: &str);
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("http://127.0.0.1:11434")
    }

    fn options(timeout_ms: u64) -> ExecuteOptions {
        ExecuteOptions::new(Duration::from_millis(timeout_ms), RetryPolicy::default())
    }

    fn executor(fake: &Arc<FakeTransport>) -> RequestExecutor {
        RequestExecutor::new(fake.clone(), Arc::new(NoopSignal))
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("What helps with a headache?", 0.2)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let fake = Arc::new(FakeTransport::new().with_replies([FakeReply::Text(
            "Rest and fluids help.".into(),
        )]));

        let result = executor(&fake)
            .execute(&endpoint(), "llama3.1:8b", &request(), options(5_000))
            .await
            .unwrap();

        assert_eq!(result.text, "Rest and fluids help.");
        assert_eq!(result.model_name, "llama3.1:8b");
        assert_eq!(fake.generate_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_with_backoff() {
        let fake = Arc::new(FakeTransport::new().with_replies([
            FakeReply::Fail(TransportError::ConnectionRefused("refused".into())),
            FakeReply::Fail(TransportError::ConnectionReset("reset".into())),
            FakeReply::Text("Third time lucky, see a doctor.".into()),
        ]));

        let started = Instant::now();
        let result = executor(&fake)
            .execute(&endpoint(), "m", &request(), options(5_000))
            .await
            .unwrap();

        assert_eq!(fake.generate_calls(), 3);
        // 1s after the first failure, 2s after the second
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_millis(3_100));
        assert!(result.elapsed_ms >= 3_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_calls_time_out_then_exhaust() {
        let fake = Arc::new(FakeTransport::new().with_replies([
            FakeReply::Hang,
            FakeReply::Hang,
            FakeReply::Hang,
        ]));

        let started = Instant::now();
        let err = executor(&fake)
            .execute(&endpoint(), "m", &request(), options(2_000))
            .await
            .unwrap_err();

        assert_eq!(fake.generate_calls(), 3);
        assert_eq!(err.kind(), ErrorKind::ExhaustedRetries);
        assert_eq!(err.attempts(), Some(3));
        assert_eq!(err.root().kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("2000ms"));

        // Three 2s deadlines plus 1s + 2s of backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(9));
        assert!(elapsed < Duration::from_millis(9_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_structured_error_is_unretryable_after_one_attempt() {
        let fake = Arc::new(FakeTransport::new().with_replies([FakeReply::Fail(
            TransportError::Service {
                status: 404,
                message: "model 'llama9' not found, try pulling it first".into(),
            },
        )]));

        let err = executor(&fake)
            .execute(&endpoint(), "llama9", &request(), options(5_000))
            .await
            .unwrap_err();

        assert_eq!(fake.generate_calls(), 1);
        assert_eq!(err.kind(), ErrorKind::Unretryable);
        assert!(
            err.to_string()
                .contains("model 'llama9' not found, try pulling it first")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_message_names_attempts_and_last_error() {
        let fake = Arc::new(FakeTransport::new().with_replies([
            FakeReply::Fail(TransportError::Network("first".into())),
            FakeReply::Fail(TransportError::NameResolution("no such host".into())),
        ]));
        let opts = ExecuteOptions::new(
            Duration::from_secs(5),
            RetryPolicy::new(2, DEFAULT_BASE_DELAY),
        );

        let err = executor(&fake)
            .execute(&endpoint(), "m", &request(), opts)
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("2 attempts"), "{msg}");
        assert!(msg.contains("no such host"), "{msg}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_reported_to_signal() {
        let fake = Arc::new(FakeTransport::new());
        let mut signal = MockSignal::new();
        signal
            .expect_report_success()
            .with(eq(endpoint()))
            .times(1)
            .return_const(());
        signal.expect_report_failure().never();

        let executor = RequestExecutor::new(fake, Arc::new(signal));
        executor
            .execute(&endpoint(), "m", &request(), options(5_000))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_reported_as_failure() {
        let fake = Arc::new(FakeTransport::new().with_replies([
            FakeReply::Fail(TransportError::ConnectionRefused("refused".into())),
            FakeReply::Fail(TransportError::ConnectionRefused("refused".into())),
            FakeReply::Fail(TransportError::ConnectionRefused("refused".into())),
        ]));
        let mut signal = MockSignal::new();
        signal.expect_report_success().never();
        signal
            .expect_report_failure()
            .times(1)
            .return_const(());

        let executor = RequestExecutor::new(fake, Arc::new(signal));
        let err = executor
            .execute(&endpoint(), "m", &request(), options(5_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExhaustedRetries);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_reported_as_connectivity_failure() {
        let fake = Arc::new(FakeTransport::new().with_replies([FakeReply::Fail(
            TransportError::HttpStatus {
                status: 400,
                body: String::new(),
            },
        )]));
        let mut signal = MockSignal::new();
        signal.expect_report_failure().never();
        signal.expect_report_success().never();

        let executor = RequestExecutor::new(fake, Arc::new(signal));
        let err = executor
            .execute(&endpoint(), "m", &request(), options(5_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unretryable);
        assert_eq!(err.to_string(), "Request rejected by the inference service: HTTP 400");
    }
}
