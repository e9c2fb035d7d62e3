//! Secret Manager error types.

use cloudfn_common::PlatformError;
use thiserror::Error;

/// Errors reading a secret.
#[derive(Error, Debug)]
pub enum SecretError {
    /// Secret Manager unavailable
    #[error("secret manager unavailable: {0}")]
    Unavailable(String),

    /// Secret or version does not exist
    #[error("secret {0} not found")]
    NotFound(String),

    /// Caller may not access the secret
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Payload is not valid base64 or UTF-8
    #[error("invalid secret payload: {0}")]
    InvalidPayload(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Quota exceeded
    #[error("secret manager quota exceeded")]
    RateLimited,

    /// HTTP error
    #[error("secret manager request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Platform error
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Result type for secret operations.
pub type SecretResult<T> = Result<T, SecretError>;

impl SecretError {
    /// Whether another read may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::RateLimited | Self::Http(_) => true,
            Self::Platform(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Shorthand for [`SecretError::Unavailable`].
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Shorthand for [`SecretError::NotFound`].
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }
}
