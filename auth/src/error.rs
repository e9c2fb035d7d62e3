//! Authentication error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Authentication errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No `Authorization` header
    #[error("empty auth header")]
    MissingHeader,

    /// Header is not `Bearer <token>`
    #[error("malformed auth header")]
    MalformedHeader,

    /// Token failed verification
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token signed by an unknown key
    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    /// Signing keys could not be retrieved
    #[error("key retrieval failed: {0}")]
    KeyFetch(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for authentication.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// HTTP status to answer the caller with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingHeader
            | Self::MalformedHeader
            | Self::InvalidToken(_)
            | Self::UnknownKey(_) => StatusCode::UNAUTHORIZED,
            Self::KeyFetch(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::KeyFetch(_))
    }

    /// Create an invalid token error.
    #[must_use]
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken(reason.into())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Self::InvalidToken(e.to_string())
    }
}
