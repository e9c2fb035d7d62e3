//! Classification of backend errors for the retry loop.
//!
//! The structured status code is consulted first. Errors that lost their code
//! on the way (wrapped, stringified) are matched against the messages Firestore
//! uses for dropped connections. The message match breaks silently if the
//! service rewords them.

use crate::error::{BackendError, StatusCode};
use std::fmt::Debug;

/// Message for a connection torn down under an in-flight call.
pub const CLOSING_TRANSPORT_ERROR: &str = "Unavailable desc = transport is closing";

/// Message for a temporarily unavailable service.
pub const UNAVAILABLE_SERVICE_ERROR: &str = "Unavailable desc = The service is temporarily unavailable";

/// Fragment identifying an unavailable service inside longer messages.
pub const UNAVAILABLE_SERVICE_FRAGMENT: &str = "The service is temporarily unavailable";

/// How the retry loop treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Refresh the session and try again
    Retryable,
    /// The cursor is exhausted; hand the sentinel back unwrapped
    EndOfSequence,
    /// Give up immediately
    Fatal,
}

/// Decides how a backend error is handled.
pub trait ErrorClassifier: Send + Sync + Debug {
    /// Classify `err`. Must be pure.
    fn classify(&self, err: &BackendError) -> ErrorClass;
}

/// Default classifier: `Unavailable` is transient, everything else is fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientErrorClassifier;

impl ErrorClassifier for TransientErrorClassifier {
    fn classify(&self, err: &BackendError) -> ErrorClass {
        match err {
            BackendError::Done => ErrorClass::EndOfSequence,
            BackendError::Status {
                code: StatusCode::Unavailable,
                ..
            } => ErrorClass::Retryable,
            other if is_transient_message(&other.to_string()) => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        }
    }
}

/// Whether an error message names a dropped connection or unavailable service.
#[must_use]
pub fn is_transient_message(message: &str) -> bool {
    message == CLOSING_TRANSPORT_ERROR
        || message == UNAVAILABLE_SERVICE_ERROR
        || message.contains(UNAVAILABLE_SERVICE_FRAGMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(err: &BackendError) -> ErrorClass {
        TransientErrorClassifier.classify(err)
    }

    #[test]
    fn test_done_is_end_of_sequence() {
        assert_eq!(classify(&BackendError::Done), ErrorClass::EndOfSequence);
    }

    #[test]
    fn test_unavailable_code_is_retryable() {
        assert_eq!(
            classify(&BackendError::unavailable("connection reset by peer")),
            ErrorClass::Retryable
        );
    }

    #[test]
    fn test_messages_without_code() {
        assert_eq!(classify(&BackendError::other(CLOSING_TRANSPORT_ERROR)), ErrorClass::Retryable);
        assert_eq!(classify(&BackendError::other(UNAVAILABLE_SERVICE_ERROR)), ErrorClass::Retryable);
        assert_eq!(
            classify(&BackendError::other(
                "rpc error: code = Unavailable desc = The service is temporarily unavailable, retry later"
            )),
            ErrorClass::Retryable
        );
        assert_eq!(classify(&BackendError::other("transport is closing soon")), ErrorClass::Fatal);
    }

    #[test]
    fn test_cancellation_and_deadline_are_fatal() {
        assert_eq!(
            classify(&BackendError::status(StatusCode::Cancelled, "context canceled")),
            ErrorClass::Fatal
        );
        assert_eq!(
            classify(&BackendError::status(StatusCode::DeadlineExceeded, "context deadline exceeded")),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_other_codes_are_fatal() {
        assert_eq!(
            classify(&BackendError::status(StatusCode::PermissionDenied, "missing permissions")),
            ErrorClass::Fatal
        );
        assert_eq!(classify(&BackendError::other("boom")), ErrorClass::Fatal);
    }

    #[test]
    fn test_message_inside_other_code_is_retryable() {
        assert_eq!(
            classify(&BackendError::status(
                StatusCode::Internal,
                "upstream: The service is temporarily unavailable"
            )),
            ErrorClass::Retryable
        );
    }
}
