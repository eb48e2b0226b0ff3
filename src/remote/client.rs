//! ScanClient - handles communication with the mark recognition service.

use std::future::Future;
use std::time::Duration;

use super::retry::{calculate_backoff, is_replay_safe, parse_retry_after, RetryPolicy};
use super::types::{parse_error_detail, ScanMode, ScanRequest, ScanResponseBody, ScanResult};
use crate::config::ServerConfig;
use crate::encode::EncodeError;

/// The environment variable name for the optional service token.
pub const TOKEN_ENV: &str = "MARK_SCANNER_TOKEN";

/// Default base URL for the recognition service.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default endpoint for auto-mode grid scans.
pub const DEFAULT_GRID_PATH: &str = "/scan/grid";

/// Default endpoint for manual-mode crop scans.
pub const DEFAULT_CROP_PATH: &str = "/scan/crop";

/// Default timeout for a scan request; recognition is slow.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP status code for rate limiting.
const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Error type for remote scan operations.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response. `message` is the service's detail verbatim when one
    /// was supplied, otherwise a mode-specific fallback.
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        detail: Option<String>,
    },

    #[error("Unexpected response from scan service: {0}")]
    InvalidResponse(String),

    #[error("artifact decode failed: {0}")]
    Decode(#[source] EncodeError),

    #[error("Rate limited: {message}")]
    RateLimit {
        /// Human-readable rate limit message
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },

    #[error("Scan was interrupted: {0}")]
    Aborted(String),

    #[error("Network error: {message} (after {attempts} attempts)")]
    NetworkError {
        message: String,
        /// Number of attempts made before giving up
        attempts: u32,
    },
}

impl RemoteError {
    /// Whether this error came from a malformed artifact payload.
    pub fn is_decode(&self) -> bool {
        matches!(self, RemoteError::Decode(_))
    }
}

/// Message shown when a failed scan carries no usable detail.
fn fallback_message(mode: ScanMode, status: u16) -> String {
    match mode {
        ScanMode::Auto => "Failed to scan grid. Check server logs.".to_string(),
        ScanMode::Manual => format!("Failed to scan crop (HTTP {})", status),
    }
}

/// Anything that can turn a [`ScanRequest`] into a [`ScanResult`].
///
/// The orchestrator only talks to this trait, so tests can substitute an
/// in-process service.
pub trait ScanService {
    fn scan(
        &self,
        request: &ScanRequest,
    ) -> impl Future<Output = Result<ScanResult, RemoteError>> + Send;
}

/// Client for the recognition service.
#[derive(Debug, Clone)]
pub struct ScanClient {
    base_url: String,
    grid_path: String,
    crop_path: String,
    token: Option<String>,
    retry: RetryPolicy,
    http_client: reqwest::Client,
}

impl ScanClient {
    /// Create a client for `base_url` with default paths, timeouts and retry.
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()?;

        Ok(Self {
            base_url: base_url.into(),
            grid_path: DEFAULT_GRID_PATH.to_string(),
            crop_path: DEFAULT_CROP_PATH.to_string(),
            token: None,
            retry: RetryPolicy::default(),
            http_client,
        })
    }

    /// Create a client from the `[server]` config section.
    ///
    /// Picks up the token from `MARK_SCANNER_TOKEN` when it is set and
    /// non-empty.
    pub fn from_config(config: &ServerConfig) -> Result<Self, RemoteError> {
        let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());
        let retry = RetryPolicy {
            connect_retries: config.connect_retries,
            ..RetryPolicy::default()
        };

        Ok(
            Self::with_timeout(&config.base_url, Duration::from_secs(config.timeout_secs))?
                .with_paths(&config.grid_path, &config.crop_path)
                .with_token(token)
                .with_retry(retry),
        )
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_paths(mut self, grid_path: impl Into<String>, crop_path: impl Into<String>) -> Self {
        self.grid_path = grid_path.into();
        self.crop_path = crop_path.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Full endpoint URL for a scan mode.
    pub fn endpoint_url(&self, mode: ScanMode) -> String {
        let path = match mode {
            ScanMode::Auto => &self.grid_path,
            ScanMode::Manual => &self.crop_path,
        };
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Send one scan request without retrying.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::RateLimit` on 429, `RemoteError::Api` for other
    /// non-2xx responses, `RemoteError::Decode` when the returned artifact is
    /// not valid base64, or `RemoteError::Http` if the request fails.
    pub async fn scan_once(&self, request: &ScanRequest) -> Result<ScanResult, RemoteError> {
        let mode = request.mode();
        let url = self.endpoint_url(mode);
        log::debug!(
            "POST {} ({} image bytes, artifact: {})",
            url,
            request.image_png.len(),
            request.artifact.as_ref().map_or(0, Vec::len)
        );

        let mut builder = self.http_client.post(&url).json(&request.to_body());
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        let status = response.status();

        if status.as_u16() == HTTP_STATUS_TOO_MANY_REQUESTS {
            let retry_after_secs = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            log::warn!(
                "Rate limited by scan service. Retry-After: {:?} seconds",
                retry_after_secs
            );
            return Err(RemoteError::RateLimit {
                message: parse_error_detail(&body)
                    .unwrap_or_else(|| "Rate limit exceeded".to_string()),
                retry_after_secs,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = parse_error_detail(&body);
            log::warn!("Scan request failed with status {}: {}", status, body);
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message: detail
                    .clone()
                    .unwrap_or_else(|| fallback_message(mode, status.as_u16())),
                detail,
            });
        }

        let body = response.text().await?;
        let parsed: ScanResponseBody = serde_json::from_str(&body)
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        parsed.into_result().map_err(RemoteError::Decode)
    }

    /// Send a scan request, retrying only failures that never reached the
    /// service: connection errors and 429 responses.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NetworkError` once connection retries are
    /// exhausted, `RemoteError::RateLimit` once rate limit retries are
    /// exhausted, and any other error from [`ScanClient::scan_once`] as is.
    pub async fn scan_with_retry(&self, request: &ScanRequest) -> Result<ScanResult, RemoteError> {
        let policy = self.retry;
        let mut connect_failures = 0u32;
        let mut rate_limits = 0u32;

        loop {
            match self.scan_once(request).await {
                Ok(result) => return Ok(result),
                Err(RemoteError::Http(ref err)) if is_replay_safe(err) => {
                    if connect_failures >= policy.connect_retries {
                        log::error!(
                            "Could not reach scan service after {} attempts: {}",
                            connect_failures + 1,
                            err
                        );
                        return Err(RemoteError::NetworkError {
                            message: err.to_string(),
                            attempts: connect_failures + 1,
                        });
                    }

                    let delay =
                        calculate_backoff(connect_failures, policy.backoff_base, policy.backoff_max);
                    connect_failures += 1;
                    log::info!(
                        "Connection failed (attempt {}/{}). Retrying in {:?}...",
                        connect_failures,
                        policy.connect_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(RemoteError::RateLimit {
                    message,
                    retry_after_secs,
                }) => {
                    if rate_limits >= policy.rate_limit_retries {
                        log::error!("Rate limit exceeded after {} attempts. Giving up.", rate_limits + 1);
                        return Err(RemoteError::RateLimit {
                            message,
                            retry_after_secs,
                        });
                    }

                    let delay = match retry_after_secs {
                        Some(secs) => Duration::from_secs(secs).min(policy.backoff_max),
                        None => calculate_backoff(rate_limits, policy.backoff_base, policy.backoff_max),
                    };
                    rate_limits += 1;
                    log::info!(
                        "Rate limited (attempt {}/{}). Retrying in {:?}...",
                        rate_limits,
                        policy.rate_limit_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl ScanService for ScanClient {
    fn scan(
        &self,
        request: &ScanRequest,
    ) -> impl Future<Output = Result<ScanResult, RemoteError>> + Send {
        self.scan_with_retry(request)
    }
}
