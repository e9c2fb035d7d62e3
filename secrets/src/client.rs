//! Secret Manager REST client.

use crate::config::SecretManagerConfig;
use crate::error::{SecretError, SecretResult};
use crate::provider::SecretProvider;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cloudfn_common::{
    AccessTokenSource, HttpConfig, MetadataTokenSource, RetryBudget, RetryPolicy,
    build_http_client,
};
use reqwest::{Client, StatusCode};
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    #[serde(default)]
    name: String,
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    #[serde(default)]
    data: String,
}

/// Client for the Secret Manager `versions:access` endpoint.
#[derive(Clone)]
pub struct SecretManagerClient {
    http: Client,
    config: SecretManagerConfig,
    tokens: Arc<dyn AccessTokenSource>,
    retry: RetryPolicy,
}

impl fmt::Debug for SecretManagerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretManagerClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SecretManagerClient {
    /// Create a client authenticated through the metadata server.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: SecretManagerConfig) -> SecretResult<Self> {
        let tokens = Arc::new(MetadataTokenSource::from_env()?);
        Self::with_token_source(config, tokens)
    }

    /// Create a client with an explicit token source.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_token_source(
        config: SecretManagerConfig,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> SecretResult<Self> {
        let http = build_http_client(&HttpConfig::default().with_timeout(config.timeout))?;
        let retry = RetryPolicy::new(RetryBudget::Fixed(config.attempts));
        Ok(Self {
            http,
            config,
            tokens,
            retry,
        })
    }

    /// Resource name of the latest version of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::InvalidConfig`] when no project is configured.
    pub fn latest_version_name(&self, name: &str) -> SecretResult<String> {
        let project = self
            .config
            .project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| SecretError::InvalidConfig("project ID is not set".to_string()))?;
        Ok(format!("projects/{project}/secrets/{name}/versions/latest"))
    }

    /// Fetch the decoded payload of the latest version, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last error once the configured attempts are spent.
    #[instrument(skip(self))]
    pub async fn access_latest(&self, name: &str) -> SecretResult<SecretString> {
        if name.is_empty() {
            return Err(SecretError::InvalidConfig("secret name is empty".to_string()));
        }
        let version = self.latest_version_name(name)?;
        self.retry
            .execute(|| self.access(&version), |e: &SecretError| {
                if e.is_retryable() {
                    warn!(error = %e, "Secret read failed, retrying");
                    true
                } else {
                    false
                }
            })
            .await
    }

    async fn access(&self, version: &str) -> SecretResult<SecretString> {
        let url = format!("{}/v1/{version}:access", self.config.endpoint);
        let token = self.tokens.access_token().await?;

        debug!(url = %url, "Secret Manager request");
        let response = self
            .http
            .get(&url)
            .bearer_auth(token.secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, version, body));
        }

        let body: AccessSecretVersionResponse = response
            .json()
            .await
            .map_err(|e| SecretError::InvalidPayload(e.to_string()))?;
        debug!(version = %body.name, "Secret version accessed");
        decode_payload(&body.payload.data)
    }
}

fn map_status(status: StatusCode, version: &str, body: String) -> SecretError {
    match status {
        StatusCode::NOT_FOUND => SecretError::not_found(version),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => SecretError::PermissionDenied(body),
        StatusCode::TOO_MANY_REQUESTS => SecretError::RateLimited,
        s if s.is_server_error() => SecretError::unavailable(format!("{s}: {body}")),
        s => SecretError::unavailable(format!("unexpected status {s}: {body}")),
    }
}

/// Decode a base64 payload into a UTF-8 secret.
///
/// # Errors
///
/// Returns [`SecretError::InvalidPayload`] for bad base64 or non-UTF-8 data.
pub fn decode_payload(data: &str) -> SecretResult<SecretString> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| SecretError::InvalidPayload(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| SecretError::InvalidPayload(e.to_string()))?;
    Ok(SecretString::from(text))
}

#[async_trait]
impl SecretProvider for SecretManagerClient {
    async fn get_secret(&self, name: &str) -> SecretResult<SecretString> {
        self.access_latest(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudfn_common::StaticTokenSource;
    use secrecy::ExposeSecret;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VERSION_PATH: &str = "/v1/projects/demo/secrets/imprint-client/versions/latest:access";

    fn client(server: &MockServer) -> SecretManagerClient {
        let config = SecretManagerConfig::default()
            .with_project_id("demo")
            .with_endpoint(server.uri());
        SecretManagerClient::with_token_source(config, Arc::new(StaticTokenSource::new("tok")))
            .unwrap()
    }

    fn payload(value: &str) -> serde_json::Value {
        json!({
            "name": "projects/demo/secrets/imprint-client/versions/3",
            "payload": { "data": STANDARD.encode(value) }
        })
    }

    #[test]
    fn test_decode_payload() {
        let secret = decode_payload(&STANDARD.encode("hunter2")).unwrap();
        assert_eq!(secret.expose_secret(), "hunter2");
        assert!(matches!(decode_payload("***"), Err(SecretError::InvalidPayload(_))));
        assert!(matches!(
            decode_payload(&STANDARD.encode([0xff, 0xfe])),
            Err(SecretError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_version_name_requires_project() {
        let mut config = SecretManagerConfig::default().with_project_id("demo");
        config.project_id = None;
        let client =
            SecretManagerClient::with_token_source(config, Arc::new(StaticTokenSource::new("t")))
                .unwrap();
        assert!(matches!(
            client.latest_version_name("x"),
            Err(SecretError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_get_secret() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERSION_PATH))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload("client-secret")))
            .expect(1)
            .mount(&server)
            .await;

        let secret = client(&server).get_secret("imprint-client").await.unwrap();
        assert_eq!(secret.expose_secret(), "client-secret");
    }

    #[tokio::test]
    async fn test_server_error_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERSION_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(VERSION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload("second")))
            .mount(&server)
            .await;

        let secret = client(&server).get_secret("imprint-client").await.unwrap();
        assert_eq!(secret.expose_secret(), "second");
    }

    #[tokio::test]
    async fn test_server_error_exhausts_two_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERSION_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let result = client(&server).get_secret("imprint-client").await;
        assert!(matches!(result, Err(SecretError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_not_found_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERSION_PATH))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).get_secret("imprint-client").await;
        assert!(matches!(result, Err(SecretError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VERSION_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let result = client(&server).get_secret("imprint-client").await;
        assert!(matches!(result, Err(SecretError::PermissionDenied(ref b)) if b == "denied"));
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let server = MockServer::start().await;
        let result = client(&server).get_secret("").await;
        assert!(matches!(result, Err(SecretError::InvalidConfig(_))));
    }
}
