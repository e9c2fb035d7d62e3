//! GCP access tokens and project detection.
//!
//! Cloud functions run with a service account whose OAuth access tokens are
//! served by the metadata server. [`MetadataTokenSource`] fetches and caches
//! them; [`StaticTokenSource`] serves a fixed token (local runs, emulators,
//! tests).

use crate::{HttpConfig, PlatformError, build_http_client};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Default metadata server host.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Tokens closer than this to expiry are fetched again.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth access token with its expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Bearer token
    pub token: SecretString,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token that expires at the given instant.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_at,
        }
    }

    /// Whether the token is still usable at `now`, leaving a safety margin.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(EXPIRY_MARGIN_SECS) > now
    }

    /// Bearer token value.
    #[must_use]
    pub fn secret(&self) -> &str {
        self.token.expose_secret()
    }
}

/// Source of OAuth access tokens for Google APIs.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Return a token valid for at least the next minute.
    async fn access_token(&self) -> Result<AccessToken, PlatformError>;

    /// Drop any cached token so the next call fetches a new one. Called when
    /// a server rejects the current token.
    async fn invalidate(&self) {}
}

/// Fixed token, never refreshed.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: SecretString,
}

impl StaticTokenSource {
    /// Wrap a fixed token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

#[async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<AccessToken, PlatformError> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: Utc::now() + ChronoDuration::days(365),
        })
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Token source backed by the GCE metadata server, with caching.
pub struct MetadataTokenSource {
    http: Client,
    base_url: String,
    cached: RwLock<Option<AccessToken>>,
}

impl MetadataTokenSource {
    /// Create a source for the metadata host named by `GCE_METADATA_HOST`,
    /// or the default host.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, PlatformError> {
        let host = std::env::var("GCE_METADATA_HOST")
            .unwrap_or_else(|_| DEFAULT_METADATA_HOST.to_string());
        Self::new(format!("http://{host}"))
    }

    /// Create a source against an explicit metadata base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, PlatformError> {
        let http = build_http_client(&HttpConfig::default().with_timeout(Duration::from_secs(5)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cached: RwLock::new(None),
        })
    }

    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<AccessToken, PlatformError> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.base_url
        );
        let response = self
            .http
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| PlatformError::unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlatformError::from_status(status, text));
        }

        let body: MetadataTokenResponse = response.json().await?;
        debug!(expires_in = body.expires_in, "Fetched access token from metadata server");
        Ok(AccessToken::new(
            body.access_token,
            Utc::now() + ChronoDuration::seconds(body.expires_in),
        ))
    }
}

#[async_trait]
impl AccessTokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<AccessToken, PlatformError> {
        if let Some(token) = self.cached.read().await.as_ref() {
            if token.is_fresh_at(Utc::now()) {
                return Ok(token.clone());
            }
        }

        let token = self.fetch().await?;
        *self.cached.write().await = Some(token.clone());
        Ok(token)
    }

    async fn invalidate(&self) {
        self.cached.write().await.take();
    }
}

/// Project ID from `GOOGLE_CLOUD_PROJECT` or `GCLOUD_PROJECT`.
#[must_use]
pub fn project_id_from_env() -> Option<String> {
    ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.is_empty())
}

/// Detect the project ID from the environment, then from the metadata server.
///
/// # Errors
///
/// Returns [`PlatformError::Config`] when neither source yields a project.
pub async fn detect_project_id(metadata_base_url: &str) -> Result<String, PlatformError> {
    if let Some(id) = project_id_from_env() {
        return Ok(id);
    }

    let http = build_http_client(&HttpConfig::default().with_timeout(Duration::from_secs(2)))?;
    let url = format!(
        "{}/computeMetadata/v1/project/project-id",
        metadata_base_url.trim_end_matches('/')
    );
    let response = http
        .get(&url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| {
            PlatformError::config(format!(
                "GOOGLE_CLOUD_PROJECT not set and metadata server unreachable: {e}"
            ))
        })?;

    if !response.status().is_success() {
        return Err(PlatformError::config(format!(
            "metadata server returned {} for project-id",
            response.status()
        )));
    }

    let id = response.text().await?.trim().to_string();
    if id.is_empty() {
        return Err(PlatformError::config("metadata server returned an empty project-id"));
    }
    Ok(id)
}
