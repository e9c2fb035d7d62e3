//! Error types for Firestore operations.

use std::fmt;
use thiserror::Error;

/// Result type for store operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Canonical RPC status codes reported by the Firestore service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The operation was cancelled by the caller
    Cancelled,
    /// Unknown error
    Unknown,
    /// Client specified an invalid argument
    InvalidArgument,
    /// Deadline expired before the operation completed
    DeadlineExceeded,
    /// Document or collection not found
    NotFound,
    /// Document already exists
    AlreadyExists,
    /// Caller lacks permission
    PermissionDenied,
    /// Quota or rate exhausted
    ResourceExhausted,
    /// System not in a state required for the operation
    FailedPrecondition,
    /// Operation aborted, typically a concurrency conflict
    Aborted,
    /// Operation past the valid range
    OutOfRange,
    /// Operation not implemented
    Unimplemented,
    /// Internal server error
    Internal,
    /// Service currently unavailable; connection-level and transient
    Unavailable,
    /// Unrecoverable data loss
    DataLoss,
    /// Missing or invalid credentials
    Unauthenticated,
}

impl StatusCode {
    /// Name as printed in status messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "Canceled",
            Self::Unknown => "Unknown",
            Self::InvalidArgument => "InvalidArgument",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::PermissionDenied => "PermissionDenied",
            Self::ResourceExhausted => "ResourceExhausted",
            Self::FailedPrecondition => "FailedPrecondition",
            Self::Aborted => "Aborted",
            Self::OutOfRange => "OutOfRange",
            Self::Unimplemented => "Unimplemented",
            Self::Internal => "Internal",
            Self::Unavailable => "Unavailable",
            Self::DataLoss => "DataLoss",
            Self::Unauthenticated => "Unauthenticated",
        }
    }

    /// Parse the `status` field of a REST error body, e.g. `DEADLINE_EXCEEDED`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let code = match name {
            "CANCELLED" => Self::Cancelled,
            "UNKNOWN" => Self::Unknown,
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            "NOT_FOUND" => Self::NotFound,
            "ALREADY_EXISTS" => Self::AlreadyExists,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "RESOURCE_EXHAUSTED" => Self::ResourceExhausted,
            "FAILED_PRECONDITION" => Self::FailedPrecondition,
            "ABORTED" => Self::Aborted,
            "OUT_OF_RANGE" => Self::OutOfRange,
            "UNIMPLEMENTED" => Self::Unimplemented,
            "INTERNAL" => Self::Internal,
            "UNAVAILABLE" => Self::Unavailable,
            "DATA_LOSS" => Self::DataLoss,
            "UNAUTHENTICATED" => Self::Unauthenticated,
            _ => return None,
        };
        Some(code)
    }

    /// Best-effort mapping of an HTTP status without an RPC status name.
    #[must_use]
    pub const fn from_http(status: u16) -> Self {
        match status {
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::Aborted,
            412 => Self::FailedPrecondition,
            429 => Self::ResourceExhausted,
            499 => Self::Cancelled,
            501 => Self::Unimplemented,
            502 | 503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            500..=599 => Self::Internal,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a document backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The cursor has no more documents
    #[error("no more items in iterator")]
    Done,

    /// RPC status with a code and description
    #[error("{code} desc = {message}")]
    Status {
        /// Status code
        code: StatusCode,
        /// Description
        message: String,
    },

    /// Error without a status code
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create a status error.
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// Create an `Unavailable` status error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::status(StatusCode::Unavailable, message)
    }

    /// Create an error without a status code.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Status code, when the error carries one.
    #[must_use]
    pub const fn code(&self) -> Option<StatusCode> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Store operation, used in error context and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create a document with a generated ID
    Add,
    /// Read one document
    Get,
    /// Merge fields into a document
    Edit,
    /// Delete a document
    Delete,
    /// Advance a cursor
    Iterate,
}

impl Operation {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Get => "get",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Iterate => "iterate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn id_suffix(id: Option<&str>) -> String {
    id.map(|id| format!(" (document '{id}')")).unwrap_or_default()
}

/// Errors returned by [`FirestoreStore`](crate::FirestoreStore).
#[derive(Error, Debug)]
pub enum FirestoreError {
    /// Invalid argument; the backend was not called
    #[error("{0}")]
    Validation(String),

    /// Collection not in the allowlist; the backend was not called
    #[error("collection name '{0}' does not exist")]
    UnknownCollection(String),

    /// Store configuration is missing or malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// The initial session could not be established
    #[error("error getting firestore session: {0}")]
    Connect(#[source] BackendError),

    /// Re-establishing the session failed; the retry loop was aborted
    #[error("error updating firestore session ({retries_left} - retries left): {source}")]
    RefreshFailed {
        /// Attempts that were still available
        retries_left: u32,
        /// Connector error
        #[source]
        source: BackendError,
    },

    /// End of a document cursor
    #[error("no more items in iterator")]
    Done,

    /// Every attempt failed with a transient error
    #[error("exceed retries number ({attempts}) for {operation} in the '{collection}' collection{}: {source}", id_suffix(.id.as_deref()))]
    RetriesExhausted {
        /// Operation attempted
        operation: Operation,
        /// Target collection
        collection: String,
        /// Target document, when the operation names one
        id: Option<String>,
        /// Backend invocations made
        attempts: u32,
        /// Last transient error
        #[source]
        source: BackendError,
    },

    /// Non-transient backend error; not retried
    #[error("unsuccessful {operation} in the '{collection}' collection{}: {source}", id_suffix(.id.as_deref()))]
    Backend {
        /// Operation attempted
        operation: Operation,
        /// Target collection
        collection: String,
        /// Target document, when the operation names one
        id: Option<String>,
        /// Backend error
        #[source]
        source: BackendError,
    },
}

impl FirestoreError {
    /// Whether this is the end-of-cursor sentinel.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Whether the input was rejected before any backend call.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnknownCollection(_))
    }

    /// Whether the backend reported a missing document.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Backend { source, .. } if source.code() == Some(StatusCode::NotFound)
        )
    }

    /// Backend error behind this error, if any.
    #[must_use]
    pub const fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Connect(source)
            | Self::RefreshFailed { source, .. }
            | Self::RetriesExhausted { source, .. }
            | Self::Backend { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
