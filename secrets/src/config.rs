//! Secret Manager client configuration.

use cloudfn_common::project_id_from_env;
use std::time::Duration;

/// Production endpoint.
pub const SECRET_MANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com";

/// Secret Manager client configuration.
#[derive(Debug, Clone)]
pub struct SecretManagerConfig {
    /// Project owning the secrets
    pub project_id: Option<String>,
    /// API endpoint
    pub endpoint: String,
    /// Request timeout
    pub timeout: Duration,
    /// Attempts per secret read
    pub attempts: u32,
}

impl Default for SecretManagerConfig {
    fn default() -> Self {
        Self {
            project_id: project_id_from_env(),
            endpoint: SECRET_MANAGER_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
            attempts: 2,
        }
    }
}

impl SecretManagerConfig {
    /// Set the project ID.
    #[must_use]
    pub fn with_project_id(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    /// Set the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set attempts per read (at least one).
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }
}
