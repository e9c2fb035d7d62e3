//! Errors of the Google API plumbing (token sources, log sinks, project
//! detection).

use reqwest::StatusCode;
use thiserror::Error;

/// Failure talking to a Google API or reading ambient configuration.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Transport-level failure
    #[error("request to Google API failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match the expected shape
    #[error("unexpected response body: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API answered with a 5xx status
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Credentials missing, expired or lacking permission
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Quota exceeded
    #[error("rate limited")]
    RateLimited,

    /// API rejected the request as malformed
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Required setting is missing or malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// Deadline exceeded
    #[error("timed out: {0}")]
    Timeout(String),
}

impl PlatformError {
    /// Whether a later attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::RateLimited | Self::Timeout(_)
        )
    }

    /// Classify a non-success response.
    #[must_use]
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        let detail = format!("{status}: {}", body.into());
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized(detail),
            StatusCode::NOT_FOUND => Self::NotFound(detail),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Self::Timeout(detail),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            s if s.is_server_error() => Self::Unavailable(detail),
            _ => Self::Rejected(detail),
        }
    }

    /// Shorthand for [`PlatformError::Unavailable`].
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Shorthand for [`PlatformError::Config`].
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
