//! Retry policy for backend calls, with exponential backoff.
//!
//! # Policy
//!
//! - Max retries: 2 (3 total attempts), configurable
//! - Initial delay: 500ms, doubling per retry
//! - Max delay: 8 seconds
//! - Jitter: down-jitter up to 25% (multiplier in [0.75, 1.0])
//!
//! # Retryable conditions
//!
//! - HTTP 408, 429, 5xx
//! - Connect and timeout errors
//!
//! Identity toolkit rejections arrive as HTTP 400 with a structured body and
//! are never retried: replaying a wrong password cannot succeed.
//!
//! # Headers
//!
//! - `X-Warden-Attempt`: 0 for the first attempt, 1+ for retries
//! - `X-Warden-Request-Id`: `warden-{uuid}`, same across all attempts

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, header::HeaderMap};
use uuid::Uuid;

pub const ATTEMPT_HEADER: &str = "X-Warden-Attempt";
pub const REQUEST_ID_HEADER: &str = "X-Warden-Request-Id";

/// Longest server-requested delay we honor.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Down-jitter factor (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// `Retry-After` in whole seconds, honored when `0 < delay < 60s`.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    let delay = Duration::from_secs(secs);
    (delay > Duration::ZERO && delay < MAX_RETRY_AFTER).then_some(delay)
}

#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

/// Backoff before retry number `backoff_step + 1`.
///
/// A valid `Retry-After` header wins over the computed delay.
#[must_use]
pub fn retry_delay(
    backoff_step: u32,
    config: &RetryConfig,
    headers: Option<&HeaderMap>,
) -> Duration {
    if let Some(delay) = headers.and_then(parse_retry_after) {
        return delay;
    }
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step as i32);
    let capped = base.min(config.max_delay.as_secs_f64());
    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

#[must_use]
pub fn generate_request_id() -> String {
    format!("warden-{}", Uuid::new_v4())
}

/// Transport failure after the retry budget is spent.
#[derive(Debug, thiserror::Error)]
#[error("request failed after {attempts} attempt(s): {source}")]
pub struct RetryError {
    pub attempts: u32,
    #[source]
    pub source: reqwest::Error,
}

/// Send a request, retrying transient failures.
///
/// `build_request` is called once per attempt. Any HTTP response that is not
/// retryable, or that arrives on the last attempt, is returned as-is so the
/// caller can read a structured error body.
pub async fn send_with_retry<F>(
    build_request: F,
    config: &RetryConfig,
) -> Result<Response, RetryError>
where
    F: Fn() -> RequestBuilder,
{
    let request_id = generate_request_id();

    let mut attempt = 0;
    loop {
        let last_attempt = attempt >= config.max_retries;
        let request = build_request()
            .header(ATTEMPT_HEADER, attempt.to_string())
            .header(REQUEST_ID_HEADER, &request_id);

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if last_attempt || !is_retryable_status(status) {
                    return Ok(response);
                }
                let delay = retry_delay(attempt, config, Some(response.headers()));
                tracing::debug!(
                    %status,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying backend call after error status"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if last_attempt || !is_retryable_error(&e) {
                    return Err(RetryError {
                        attempts: attempt + 1,
                        source: e,
                    });
                }
                let delay = retry_delay(attempt, config, None);
                tracing::debug!(
                    error = %e,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying backend call after connection error"
                );
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}
