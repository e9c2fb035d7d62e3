//! Helpers for HTTP-triggered functions: JSON error bodies, CORS preflight
//! responses and query parameters.

use reqwest::StatusCode;
use reqwest::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE, HeaderMap, HeaderValue, InvalidHeaderValue,
};
use serde::Serialize;
use url::Url;

/// Request headers accepted by CORS preflight responses.
pub const CORS_ALLOWED_HEADERS: &str = "Content-Type, Content-Length, Accept-Encoding, Accept, Authorization, auth_code, redirect_url, Type, Version, crm_type, email_provider";

/// Preflight cache lifetime in seconds.
pub const CORS_MAX_AGE_SECS: u32 = 3600;

/// Error response with a JSON `{"message": ...}` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonError {
    #[serde(skip)]
    status: StatusCode,
    message: String,
}

impl JsonError {
    /// Create an error response.
    #[must_use]
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Serialized JSON body.
    #[must_use]
    pub fn body(&self) -> String {
        serde_json::json!({ "message": self.message }).to_string()
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

/// Status and headers answering a CORS preflight request.
///
/// # Errors
///
/// Returns an error if `allow_methods` is not a valid header value.
pub fn cors_preflight_headers(allow_methods: &str) -> Result<(StatusCode, HeaderMap), InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_str(allow_methods)?);
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(CORS_ALLOWED_HEADERS));
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(CORS_MAX_AGE_SECS));
    Ok((StatusCode::NO_CONTENT, headers))
}

/// First value of query parameter `key`, or `default` when absent or empty.
#[must_use]
pub fn url_parameter(url: &Url, key: &str, default: &str) -> String {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error() {
        let err = JsonError::new("order not found", StatusCode::NOT_FOUND);

        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.body(), r#"{"message":"order not found"}"#);
        assert_eq!(err.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_cors_preflight() {
        let (status, headers) = cors_preflight_headers("GET, POST").unwrap();

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET, POST");
        assert_eq!(headers[ACCESS_CONTROL_MAX_AGE], "3600");
        assert!(
            headers[ACCESS_CONTROL_ALLOW_HEADERS]
                .to_str()
                .unwrap()
                .contains("crm_type")
        );
    }

    #[test]
    fn test_cors_rejects_bad_methods() {
        assert!(cors_preflight_headers("GET\n").is_err());
    }

    #[test]
    fn test_url_parameter() {
        let url = Url::parse("https://fn.example.com/orders?status=open&status=closed&page=").unwrap();

        assert_eq!(url_parameter(&url, "status", "all"), "open");
        assert_eq!(url_parameter(&url, "page", "1"), "1");
        assert_eq!(url_parameter(&url, "limit", "50"), "50");
    }
}
