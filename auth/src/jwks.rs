//! Signing key retrieval and caching.
//!
//! Keys are fetched from the configured JWKS endpoint and cached for the
//! `max-age` of the response's `Cache-Control` header. Concurrent misses
//! share a single fetch.

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use cloudfn_common::{HttpConfig, build_http_client};
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use reqwest::header::CACHE_CONTROL;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Minimum RSA modulus length (base64url) accepted, 2048 bits.
const MIN_RSA_MODULUS_LEN: usize = 340;

/// JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type
    pub kty: String,
    /// Key ID
    pub kid: String,
    /// Key use
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// RSA modulus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

/// JSON Web Key Set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    /// Keys
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Usable RS256 keys by ID. Unsupported or weak keys are skipped.
    #[must_use]
    pub fn decoding_keys(&self) -> HashMap<String, DecodingKey> {
        self.keys
            .iter()
            .filter_map(|jwk| jwk_to_decoding_key(jwk).map(|k| (jwk.kid.clone(), k)))
            .collect()
    }
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    if jwk.kty != "RSA" {
        warn!(kid = %jwk.kid, kty = %jwk.kty, "Unsupported key type");
        return None;
    }
    let n = jwk.n.as_ref()?;
    let e = jwk.e.as_ref()?;
    if n.len() < MIN_RSA_MODULUS_LEN {
        warn!(kid = %jwk.kid, "RSA key too small, rejecting");
        return None;
    }
    DecodingKey::from_rsa_components(n, e).ok()
}

/// `max-age` of a `Cache-Control` value.
#[must_use]
pub fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Source of token verification keys.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Key with ID `kid`.
    async fn key(&self, kid: &str) -> AuthResult<DecodingKey>;
}

struct CacheEntry {
    keys: HashMap<String, DecodingKey>,
    expires_at: Instant,
}

/// JWKS-backed key cache.
pub struct JwkCache {
    http: Client,
    jwks_url: String,
    default_ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
    refresh: Mutex<()>,
}

impl std::fmt::Debug for JwkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwkCache")
            .field("jwks_url", &self.jwks_url)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl JwkCache {
    /// Create an empty cache for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &AuthConfig) -> AuthResult<Self> {
        let http = build_http_client(&HttpConfig::default().with_timeout(config.timeout))
            .map_err(|e| AuthError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            jwks_url: config.jwks_url.clone(),
            default_ttl: config.default_cache_ttl,
            entry: RwLock::new(None),
            refresh: Mutex::new(()),
        })
    }

    async fn cached(&self, kid: &str) -> Option<DecodingKey> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|e| e.expires_at > Instant::now())
            .and_then(|e| e.keys.get(kid).cloned())
    }

    /// Whether the cache holds no unexpired keys.
    pub async fn is_stale(&self) -> bool {
        self.entry
            .read()
            .await
            .as_ref()
            .is_none_or(|e| e.expires_at <= Instant::now())
    }

    /// Number of cached keys.
    pub async fn key_count(&self) -> usize {
        self.entry.read().await.as_ref().map_or(0, |e| e.keys.len())
    }

    /// Fetch the key set and replace the cache.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyFetch`] on transport, status or parse failures.
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    pub async fn refresh(&self) -> AuthResult<()> {
        info!("Fetching JWKS");
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("failed to fetch JWKS: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyFetch(format!(
                "JWKS fetch failed with status: {}",
                response.status()
            )));
        }

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(self.default_ttl);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("failed to parse JWKS: {e}")))?;
        let keys = jwks.decoding_keys();
        info!(keys = keys.len(), ttl_secs = ttl.as_secs(), "JWKS cache updated");

        *self.entry.write().await = Some(CacheEntry {
            keys,
            expires_at: Instant::now() + ttl,
        });
        Ok(())
    }
}

#[async_trait]
impl KeyProvider for JwkCache {
    async fn key(&self, kid: &str) -> AuthResult<DecodingKey> {
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }
        debug!(kid = %kid, "Key not cached, refreshing");
        self.refresh().await?;

        self.cached(kid)
            .await
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }
}

/// Fixed key set, for local runs and tests.
#[derive(Default)]
pub struct StaticKeyProvider {
    keys: HashMap<String, DecodingKey>,
}

impl StaticKeyProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider holding the usable keys of `jwks`.
    #[must_use]
    pub fn from_jwks(jwks: &Jwks) -> Self {
        Self {
            keys: jwks.decoding_keys(),
        }
    }

    /// Add a key.
    #[must_use]
    pub fn with_key(mut self, kid: impl Into<String>, key: DecodingKey) -> Self {
        self.keys.insert(kid.into(), key);
        self
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn key(&self, kid: &str) -> AuthResult<DecodingKey> {
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }
}
