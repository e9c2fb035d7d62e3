//! Outbound HTTP client configuration.
//!
//! Every REST adapter in the workspace (Firestore, Secret Manager, Cloud
//! Logging, metadata server, Imprint Engine) builds its client here so that
//! timeouts and the user agent stay consistent.

use reqwest::Client;
use std::time::Duration;

/// Settings shared by all outbound clients.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request deadline
    pub timeout: Duration,
    /// TCP/TLS connect deadline
    pub connect_timeout: Duration,
    /// How long an idle pooled connection is kept
    pub pool_idle_timeout: Duration,
    /// `User-Agent` header
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(30),
            user_agent: concat!("cloudfn-utils/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    /// Set the whole-request deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect deadline.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Build a rustls-backed client from `config`.
///
/// # Errors
///
/// Returns the builder error when TLS initialization fails.
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .user_agent(config.user_agent.as_str())
        .use_rustls_tls()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.user_agent.starts_with("cloudfn-utils/"));
    }

    #[test]
    fn test_builders_and_build() {
        let config = HttpConfig::default()
            .with_timeout(Duration::from_secs(2))
            .with_connect_timeout(Duration::from_secs(1))
            .with_user_agent("orders-function");

        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.user_agent, "orders-function");
        assert!(build_http_client(&config).is_ok());
    }
}
