//! Imprint Engine error types.

use cloudfn_firestore::FirestoreError;
use cloudfn_secrets::SecretError;
use reqwest::StatusCode;
use thiserror::Error;

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct GraphQlErrorMessage {
    /// Error message
    pub message: String,
}

/// Imprint Engine errors.
#[derive(Error, Debug)]
pub enum ImprintError {
    /// Stored credentials could not be read
    #[error("failed to get shipping secret data by ID {id}: {source}")]
    ModelLoad {
        /// Credentials document ID
        id: String,
        /// Underlying error
        source: FirestoreError,
    },

    /// Stored credentials have an unexpected shape
    #[error("failed to decode shipping secret data: {0}")]
    ModelDecode(#[from] serde_json::Error),

    /// Renewed token could not be stored
    #[error("failed to update shipping secret data: {0}")]
    ModelSave(FirestoreError),

    /// Refresh token could not be read
    #[error("failed to get refresh token from secret manager: {0}")]
    RefreshToken(#[from] SecretError),

    /// Auth endpoint answered with a non-200 status
    #[error("failed to get IE access token (status {0})")]
    AuthStatus(StatusCode),

    /// Auth endpoint answered with an unexpected body
    #[error("failed to parse IE auth response: {0}")]
    AuthResponse(String),

    /// Required setting is missing or invalid
    #[error("{0}")]
    Config(String),

    /// External ID is not an integer
    #[error("invalid format of the external ID: {0}")]
    InvalidExternalId(String),

    /// GraphQL endpoint answered with a non-200 status
    #[error("GraphQL request failed (status {status}): {body}")]
    GraphQlStatus {
        /// Response status
        status: StatusCode,
        /// Response body
        body: String,
    },

    /// GraphQL response carried errors
    #[error("GraphQL errors: {}", join_messages(.0))]
    GraphQl(Vec<GraphQlErrorMessage>),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn join_messages(errors: &[GraphQlErrorMessage]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for Imprint Engine operations.
pub type ImprintResult<T> = Result<T, ImprintError>;

impl ImprintError {
    /// Check if error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::AuthStatus(s) | Self::GraphQlStatus { status: s, .. } => {
                s.is_server_error() || *s == StatusCode::TOO_MANY_REQUESTS
            }
            Self::RefreshToken(e) => e.is_retryable(),
            _ => false,
        }
    }
}
