//! Retry and backoff for scan submissions.
//!
//! Every successful scan appends a spreadsheet row on the server, so a
//! request may only be replayed when it provably never got processed:
//! connection failures and 429 responses. Timeouts and 5xx are final.

use std::time::Duration;

/// Default retry attempts after a connection failure.
pub const DEFAULT_CONNECT_RETRIES: u32 = 2;

/// Default retry attempts after a 429 response.
pub const DEFAULT_RATE_LIMIT_RETRIES: u32 = 2;

/// Base delay for exponential backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Maximum delay cap for exponential backoff.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);

/// How a submission is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub connect_retries: u32,
    pub rate_limit_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Send once, never retry.
    pub fn none() -> Self {
        Self {
            connect_retries: 0,
            rate_limit_retries: 0,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_retries: DEFAULT_CONNECT_RETRIES,
            rate_limit_retries: DEFAULT_RATE_LIMIT_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

/// Whether a transport error guarantees the request never reached the server.
pub fn is_replay_safe(error: &reqwest::Error) -> bool {
    error.is_connect()
}

/// Parse the Retry-After header value in seconds.
///
/// Only the integer-seconds form is understood.
pub fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Exponential backoff: min(base * 2^attempt + base/2, max).
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter = Duration::from_millis((base.as_millis() as u64).min(1000) / 2);
    exponential.saturating_add(jitter).min(max)
}
