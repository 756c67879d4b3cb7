//! Error types for the service clients.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit Info
// ─────────────────────────────────────────────────────────────────────────────

/// Information about a rate limit error.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// The error message from the provider.
    pub message: String,
    /// How long to wait before retrying (if the provider specified).
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Build from a response body and an optional `retry-after` header value.
    pub fn from_header(message: impl Into<String>, retry_after_header: Option<&str>) -> Self {
        Self {
            message: message.into(),
            retry_after: retry_after_header.and_then(parse_retry_after_header),
        }
    }
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {:.2}s)", retry_after.as_secs_f64())?;
        }
        Ok(())
    }
}

/// Parse a Retry-After header value given in seconds.
fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmError
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for calls to an external model service.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Non-success response from the provider.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Network/connectivity error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (missing key, bad URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The provider answered 2xx but the payload was unusable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded (retryable with backoff).
    #[error("Rate limit exceeded: {0}")]
    RateLimit(RateLimitInfo),

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(RateLimitInfo::new(message))
    }

    /// Get the retry-after duration if this is a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(info) => info.retry_after,
            _ => None,
        }
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            LlmError::Serialization(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

/// Map a non-success HTTP status and body to an error.
///
/// Shared by every client in this crate so status handling stays uniform.
pub(crate) fn status_error(
    status: reqwest::StatusCode,
    message: String,
    retry_after: Option<&str>,
) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Auth(format!("Authentication failed: {}", message)),
        429 => LlmError::RateLimit(RateLimitInfo::from_header(message, retry_after)),
        500..=599 => LlmError::Backend(format!("Server error ({}): {}", status, message)),
        _ => LlmError::Backend(format!("HTTP {}: {}", status, message)),
    }
}
