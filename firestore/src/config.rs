//! Firestore connection configuration.

use crate::error::FirestoreError;
use cloudfn_common::project_id_from_env;
use std::time::Duration;

/// Environment variable holding the retry budget.
pub const RETRIES_ENV_VAR: &str = "FIRESTORE_RETRIES_NUMBER";

/// Environment variable pointing at a local emulator.
pub const EMULATOR_HOST_ENV_VAR: &str = "FIRESTORE_EMULATOR_HOST";

/// Production endpoint.
pub const FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com";

/// Firestore configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: Option<String>,
    /// Database ID
    pub database: String,
    /// API endpoint, without path
    pub endpoint: String,
    /// Whether the endpoint is an emulator
    pub emulator: bool,
    /// Request timeout
    pub timeout: Duration,
    /// Documents requested per cursor page
    pub page_size: u32,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        let emulator_host = std::env::var(EMULATOR_HOST_ENV_VAR)
            .ok()
            .filter(|h| !h.is_empty());
        let config = Self {
            project_id: project_id_from_env(),
            database: "(default)".to_string(),
            endpoint: FIRESTORE_ENDPOINT.to_string(),
            emulator: false,
            timeout: Duration::from_secs(30),
            page_size: 300,
        };
        match emulator_host {
            Some(host) => config.with_emulator_host(&host),
            None => config,
        }
    }
}

impl FirestoreConfig {
    /// Set the project ID.
    #[must_use]
    pub fn with_project_id(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    /// Set the database ID.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Use a production-style endpoint (a proxy or a test server).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self.emulator = false;
        self
    }

    /// Use the emulator at `host` (`host:port`).
    #[must_use]
    pub fn with_emulator_host(mut self, host: &str) -> Self {
        self.endpoint = format!("http://{}", host.trim_end_matches('/'));
        self.emulator = true;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the cursor page size (at least one).
    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// URL of the documents root, e.g.
    /// `https://firestore.googleapis.com/v1/projects/p/databases/(default)/documents`.
    ///
    /// # Errors
    ///
    /// Returns [`FirestoreError::Config`] when no project is configured.
    pub fn documents_root(&self) -> Result<String, FirestoreError> {
        let project = self
            .project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                FirestoreError::Config("GCLOUD_PROJECT or GOOGLE_CLOUD_PROJECT must be set".to_string())
            })?;
        Ok(format!(
            "{}/v1/projects/{project}/databases/{}/documents",
            self.endpoint, self.database
        ))
    }
}
