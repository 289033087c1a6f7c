//! Retrying HTTP execution with capped exponential backoff.
//!
//! [`RetryingClient`] wraps a `reqwest::Client` and re-fires idempotent
//! requests on transient failures:
//!
//! - transport/connection failures and request timeouts
//! - responses with status >= 500
//!
//! 2xx-4xx responses are returned to the caller untouched; classifying them
//! is the typed client's job. Backoff waits select on the cancellation
//! token, so a shutdown that lands mid-wait aborts the call immediately
//! without consuming the next attempt.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{BeaconError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// RETRYING CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// HTTP executor with capped exponential backoff.
///
/// The caller must provide idempotent requests: bodies are re-sent verbatim
/// on every attempt via [`reqwest::RequestBuilder::try_clone`].
///
/// # Attempt schedule
///
/// With defaults (3 retries, 100ms initial, factor 2.0, 5s cap):
///
/// | Attempt | Wait before |
/// |---------|-------------|
/// | 0 | none |
/// | 1 | 100ms |
/// | 2 | 200ms |
/// | 3 | 400ms |
#[derive(Debug, Clone)]
pub struct RetryingClient {
    /// Underlying HTTP client (connection pooling lives here).
    client: reqwest::Client,
    /// Backoff parameters.
    config: RetryConfig,
    /// Cancellation observed during backoff waits.
    cancel: CancellationToken,
}

impl RetryingClient {
    /// Create a new retrying client.
    ///
    /// The returned client is never cancelled; use
    /// [`with_cancellation`](Self::with_cancellation) to tie it to a
    /// shutdown token.
    #[must_use]
    pub fn new(client: reqwest::Client, config: RetryConfig) -> Self {
        Self {
            client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie backoff waits to a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Access the underlying HTTP client.
    #[must_use]
    pub const fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Backoff wait before attempt `k`.
    ///
    /// Attempt 0 fires immediately. For `k >= 1` the wait is
    /// `min(initial_backoff * backoff_factor^(k-1), max_backoff)` - monotone
    /// non-decreasing in `k`, constant once the cap is reached.
    #[must_use]
    pub fn compute_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // Factor powers overflow f64 well before u32::MAX attempts; the min()
        // against the cap keeps the result finite either way.
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let wait = self.config.initial_backoff.as_secs_f64() * self.config.backoff_factor.powi(exponent);
        let capped = wait.min(self.config.max_backoff.as_secs_f64());

        Duration::from_secs_f64(capped)
    }

    /// Execute a request with retries.
    ///
    /// Returns the first response whose status is below 500. Exhausted
    /// retries surface the last transient failure.
    ///
    /// # Errors
    ///
    /// - [`BeaconError::NotCloneable`] if the request body cannot be cloned
    ///   for retry attempts
    /// - [`BeaconError::Cancelled`] if cancellation fires during a backoff
    ///   wait
    /// - [`BeaconError::Connection`] / [`BeaconError::Timeout`] /
    ///   [`BeaconError::Upstream`] once all attempts are spent
    pub async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let wait = self.compute_backoff(attempt);
                debug!(attempt, wait_ms = wait.as_millis() as u64, "Retrying request");

                tokio::select! {
                    () = self.cancel.cancelled() => {
                        return Err(BeaconError::Cancelled);
                    }
                    () = tokio::time::sleep(wait) => {}
                }
            }

            let builder = request.try_clone().ok_or(BeaconError::NotCloneable)?;

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        warn!(attempt, status = status.as_u16(), "Upstream server error");
                        last_error = Some(BeaconError::from_status(status.as_u16(), &body));
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let error = BeaconError::from(e);
                    if error.is_retryable() {
                        warn!(attempt, error = %error, "Transient request failure");
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BeaconError::Connection("no attempts executed".into())))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    use proptest::prelude::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use super::*;

    fn fast_config() -> RetryConfig {
        RetryConfig::default()
            .with_initial_backoff(Duration::from_millis(10))
            .with_max_backoff(Duration::from_millis(100))
    }

    /// Responds 5xx for the first `failures` requests, then 200.
    struct FlakyResponder {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    impl Respond for FlakyResponder {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                ResponseTemplate::new(503).set_body_string("overloaded")
            } else {
                ResponseTemplate::new(200).set_body_string("ok")
            }
        }
    }

    #[tokio::test]
    async fn succeeds_after_server_errors() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicU32::new(0));

        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(FlakyResponder {
                failures: 2,
                calls: calls.clone(),
            })
            .mount(&server)
            .await;

        let client = RetryingClient::new(
            reqwest::Client::new(),
            RetryConfig::default()
                .with_initial_backoff(Duration::from_millis(100))
                .with_max_backoff(Duration::from_secs(5)),
        );

        let started = Instant::now();
        let response = client
            .execute(client.inner().get(format!("{}/flaky", server.uri())))
            .await
            .expect("request failed");

        // Two 503s cost 100ms + 200ms of backoff before the 200.
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad state id"))
            .expect(1)
            .mount(&server)
            .await;

        let client = RetryingClient::new(reqwest::Client::new(), fast_config());
        let response = client
            .execute(client.inner().get(format!("{}/bad", server.uri())))
            .await
            .expect("4xx must pass through");

        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_upstream_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(4) // initial attempt + 3 retries
            .mount(&server)
            .await;

        let client = RetryingClient::new(reqwest::Client::new(), fast_config());
        let result = client
            .execute(client.inner().get(format!("{}/down", server.uri())))
            .await;

        assert!(matches!(result, Err(BeaconError::Upstream { status: 502, .. })));
    }

    #[tokio::test]
    async fn cancellation_during_backoff_aborts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let client = RetryingClient::new(
            reqwest::Client::new(),
            RetryConfig::default()
                .with_initial_backoff(Duration::from_secs(30))
                .with_max_backoff(Duration::from_secs(60)),
        )
        .with_cancellation(cancel.clone());

        let url = format!("{}/down", server.uri());
        let handle = tokio::spawn(async move { client.execute(client.inner().get(url)).await });

        // Let the first attempt fail and the backoff wait begin.
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancellation must resolve the call promptly")
            .expect("task panicked");

        assert!(matches!(result, Err(BeaconError::Cancelled)));
    }

    #[test]
    fn backoff_schedule_matches_defaults() {
        let client = RetryingClient::new(reqwest::Client::new(), RetryConfig::default());

        assert_eq!(client.compute_backoff(0), Duration::ZERO);
        assert_eq!(client.compute_backoff(1), Duration::from_millis(100));
        assert_eq!(client.compute_backoff(2), Duration::from_millis(200));
        assert_eq!(client.compute_backoff(3), Duration::from_millis(400));
        // 100ms * 2^9 = 51.2s caps at 5s
        assert_eq!(client.compute_backoff(10), Duration::from_secs(5));
    }

    proptest! {
        #[test]
        fn backoff_is_monotone_then_constant(attempt in 0u32..64) {
            let client = RetryingClient::new(reqwest::Client::new(), RetryConfig::default());
            let config = RetryConfig::default();

            let current = client.compute_backoff(attempt);
            let next = client.compute_backoff(attempt + 1);

            prop_assert!(next >= current);
            prop_assert!(current <= config.max_backoff);
            if current == config.max_backoff {
                prop_assert_eq!(next, config.max_backoff);
            }
        }
    }
}
