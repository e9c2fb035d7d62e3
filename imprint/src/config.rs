//! Imprint Engine configuration.

use std::time::Duration;

/// Environment variable holding the token endpoint.
pub const AUTH_URL_ENV_VAR: &str = "IMPRINT_ENGINE_AUTH_URL";
/// Environment variable holding the GraphQL endpoint.
pub const GRAPHQL_URL_ENV_VAR: &str = "IMPRINT_ENGINE_GRAPHQL_URL";
/// Environment variable holding the platform application ID.
pub const APP_ID_ENV_VAR: &str = "IE_PLATFORM_APP_ID";

/// Renewed tokens are stored as valid for 20 hours, below their real 24.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(20 * 60 * 60);

/// Imprint Engine configuration.
#[derive(Debug, Clone)]
pub struct ImprintConfig {
    /// Token endpoint
    pub auth_url: Option<String>,
    /// GraphQL endpoint
    pub graphql_url: Option<String>,
    /// Platform application ID, unparsed
    pub app_id: Option<String>,
    /// Stored lifetime of renewed tokens
    pub token_lifetime: Duration,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for ImprintConfig {
    fn default() -> Self {
        Self {
            auth_url: std::env::var(AUTH_URL_ENV_VAR).ok(),
            graphql_url: std::env::var(GRAPHQL_URL_ENV_VAR).ok(),
            app_id: std::env::var(APP_ID_ENV_VAR).ok(),
            token_lifetime: TOKEN_LIFETIME,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ImprintConfig {
    /// Set the token endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    /// Set the GraphQL endpoint.
    #[must_use]
    pub fn with_graphql_url(mut self, url: impl Into<String>) -> Self {
        self.graphql_url = Some(url.into());
        self
    }

    /// Set the platform application ID.
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Set the stored lifetime of renewed tokens.
    #[must_use]
    pub const fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
