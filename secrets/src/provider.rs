//! Secret provider abstraction.

use crate::error::{SecretError, SecretResult};
use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;

/// Source of named secrets.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Latest value of secret `name`.
    async fn get_secret(&self, name: &str) -> SecretResult<SecretString>;
}

/// In-memory provider for local runs and tests.
#[derive(Debug, Default)]
pub struct StaticSecretProvider {
    secrets: HashMap<String, SecretString>,
}

impl StaticSecretProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret.
    #[must_use]
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), SecretString::from(value.into()));
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_secret(&self, name: &str) -> SecretResult<SecretString> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::not_found(name))
    }
}
