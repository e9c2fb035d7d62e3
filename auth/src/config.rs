//! Firebase auth configuration.

use cloudfn_common::project_id_from_env;
use std::time::Duration;

/// Public keys of the securetoken service account, as a JWK set.
pub const SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Issuer prefix of Firebase ID tokens.
pub const SECURETOKEN_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Firebase auth configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Firebase project ID, the expected audience
    pub project_id: Option<String>,
    /// JWKS endpoint
    pub jwks_url: String,
    /// Key cache lifetime when the response carries no `max-age`
    pub default_cache_ttl: Duration,
    /// Clock skew tolerance in seconds
    pub leeway_secs: u64,
    /// Key fetch timeout
    pub timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            project_id: project_id_from_env(),
            jwks_url: SECURETOKEN_JWKS_URL.to_string(),
            default_cache_ttl: Duration::from_secs(3600),
            leeway_secs: 60,
            timeout: Duration::from_secs(10),
        }
    }
}

impl AuthConfig {
    /// Set the project ID.
    #[must_use]
    pub fn with_project_id(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    /// Set the JWKS endpoint.
    #[must_use]
    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = url.into();
        self
    }

    /// Set the fallback key cache lifetime.
    #[must_use]
    pub const fn with_default_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = ttl;
        self
    }

    /// Set the clock skew tolerance.
    #[must_use]
    pub const fn with_leeway_secs(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    /// Expected `iss` claim for the configured project.
    #[must_use]
    pub fn issuer(&self) -> Option<String> {
        self.project_id
            .as_deref()
            .map(|p| format!("{SECURETOKEN_ISSUER_PREFIX}{p}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer() {
        let config = AuthConfig::default().with_project_id("demo");
        assert_eq!(
            config.issuer().as_deref(),
            Some("https://securetoken.google.com/demo")
        );
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.jwks_url, SECURETOKEN_JWKS_URL);
        assert_eq!(config.default_cache_ttl, Duration::from_secs(3600));
    }
}
