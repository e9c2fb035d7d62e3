//! Request authorization against Firebase ID tokens.

use crate::claims::FirebaseToken;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwks::{JwkCache, KeyProvider};
use chrono::Utc;
use cloudfn_common::{LogType, log_write};
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Longest accepted `sub` claim.
const MAX_UID_LEN: usize = 128;

/// Token from an `Authorization` value of the exact form `Bearer <token>`.
#[must_use]
pub fn parse_bearer(header: &str) -> Option<&str> {
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

/// Firebase ID token verifier.
pub struct FirebaseAuth {
    config: AuthConfig,
    keys: Arc<dyn KeyProvider>,
}

impl std::fmt::Debug for FirebaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAuth")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FirebaseAuth {
    /// Create a verifier fetching keys from the configured JWKS endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] when no project is configured or the
    /// HTTP client cannot be built.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        let keys = Arc::new(JwkCache::new(&config)?);
        Self::with_key_provider(config, keys)
    }

    /// Create a verifier with an explicit key source.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] when no project is configured.
    pub fn with_key_provider(config: AuthConfig, keys: Arc<dyn KeyProvider>) -> AuthResult<Self> {
        if config.project_id.as_deref().is_none_or(str::is_empty) {
            return Err(AuthError::Config("project ID is not set".to_string()));
        }
        Ok(Self { config, keys })
    }

    /// Authorize a request from its `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Every error maps to a response status through [`AuthError::status`]:
    /// 401 for a missing, malformed or invalid token and 500 when signing
    /// keys cannot be retrieved.
    pub async fn check_authorization(&self, header: Option<&str>) -> AuthResult<FirebaseToken> {
        let header = header.unwrap_or_default();
        if header.is_empty() {
            log_write(LogType::Info, 0, "empty auth header", "");
            return Err(AuthError::MissingHeader);
        }

        let token = parse_bearer(header).ok_or(AuthError::MalformedHeader)?;

        self.verify_id_token(token).await.inspect_err(|e| {
            log_write(LogType::Info, 0, &format!("token verification failed: {e}"), "");
        })
    }

    /// Verify a raw ID token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] or [`AuthError::UnknownKey`] for
    /// tokens that fail verification and [`AuthError::KeyFetch`] when keys
    /// cannot be retrieved.
    #[instrument(skip_all)]
    pub async fn verify_id_token(&self, token: &str) -> AuthResult<FirebaseToken> {
        let (project, issuer) = match (self.config.project_id.as_deref(), self.config.issuer()) {
            (Some(p), Some(i)) => (p, i),
            _ => return Err(AuthError::Config("project ID is not set".to_string())),
        };

        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::invalid_token(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_token("token has no kid"))?;
        let key = self.keys.key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.config.leeway_secs;
        validation.set_audience(&[project]);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let claims = decode::<FirebaseToken>(token, &key, &validation)?.claims;
        check_times_and_subject(&claims, self.config.leeway_secs)?;

        debug!(uid = %claims.uid(), "ID token verified");
        Ok(claims)
    }
}

fn check_times_and_subject(claims: &FirebaseToken, leeway_secs: u64) -> AuthResult<()> {
    if claims.sub.is_empty() {
        return Err(AuthError::invalid_token("empty subject"));
    }
    if claims.sub.len() > MAX_UID_LEN {
        return Err(AuthError::invalid_token("subject longer than 128 characters"));
    }
    let latest = Utc::now().timestamp() + i64::try_from(leeway_secs).unwrap_or(i64::MAX);
    if claims.iat > latest {
        return Err(AuthError::invalid_token("token issued in the future"));
    }
    if claims.auth_time.is_some_and(|t| t > latest) {
        return Err(AuthError::invalid_token("auth_time in the future"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwks::{Jwks, StaticKeyProvider};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;
    use tracing_test::traced_test;

    const KEY_PEM: &[u8] = include_bytes!("../tests/fixtures/test_key.pem");
    const JWKS: &str = include_str!("../tests/fixtures/jwks.json");

    fn auth() -> FirebaseAuth {
        let jwks: Jwks = serde_json::from_str(JWKS).unwrap();
        FirebaseAuth::with_key_provider(
            AuthConfig::default().with_project_id("demo"),
            Arc::new(StaticKeyProvider::from_jwks(&jwks)),
        )
        .unwrap()
    }

    fn sign(claims: &serde_json::Value, kid: Option<&str>) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        encode(&header, claims, &EncodingKey::from_rsa_pem(KEY_PEM).unwrap()).unwrap()
    }

    fn claims_for(sub: &str) -> serde_json::Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": "https://securetoken.google.com/demo",
            "aud": "demo",
            "sub": sub,
            "iat": now - 10,
            "exp": now + 3600,
            "auth_time": now - 10,
            "email": "ada@example.com",
            "role": "admin",
        })
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("  Bearer   abc "), Some("abc"));
        assert_eq!(parse_bearer("bearer abc"), None);
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer a b"), None);
        assert_eq!(parse_bearer("Basic abc"), None);
    }

    #[test]
    fn test_requires_project() {
        let mut config = AuthConfig::default();
        config.project_id = None;
        let result = FirebaseAuth::with_key_provider(config, Arc::new(StaticKeyProvider::new()));
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[tokio::test]
    async fn test_valid_token() {
        let token = sign(&claims_for("user-1"), Some("test-key-1"));
        let header = format!("Bearer {token}");

        let verified = auth().check_authorization(Some(&header)).await.unwrap();

        assert_eq!(verified.uid(), "user-1");
        assert_eq!(verified.email.as_deref(), Some("ada@example.com"));
        assert_eq!(verified.claim("role"), Some(&json!("admin")));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_header() {
        let err = auth().check_authorization(None).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingHeader));
        assert_eq!(err.status().as_u16(), 401);
        assert!(logs_contain("empty auth header"));

        let err = auth().check_authorization(Some("")).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingHeader));
    }

    #[tokio::test]
    async fn test_malformed_header() {
        let err = auth().check_authorization(Some("Token abc")).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader));
        assert_eq!(err.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn test_wrong_audience() {
        let mut claims = claims_for("user-1");
        claims["aud"] = json!("other-project");
        let token = sign(&claims, Some("test-key-1"));

        let err = auth().verify_id_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_wrong_issuer() {
        let mut claims = claims_for("user-1");
        claims["iss"] = json!("https://accounts.google.com");
        let token = sign(&claims, Some("test-key-1"));

        assert!(matches!(
            auth().verify_id_token(&token).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let mut claims = claims_for("user-1");
        let now = Utc::now().timestamp();
        claims["iat"] = json!(now - 7200);
        claims["exp"] = json!(now - 3600);
        let token = sign(&claims, Some("test-key-1"));

        let err = auth().verify_id_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
        assert_eq!(err.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn test_future_iat_rejected() {
        let mut claims = claims_for("user-1");
        claims["iat"] = json!(Utc::now().timestamp() + 600);
        let token = sign(&claims, Some("test-key-1"));

        assert!(matches!(
            auth().verify_id_token(&token).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_and_long_subject() {
        let token = sign(&claims_for(""), Some("test-key-1"));
        assert!(matches!(
            auth().verify_id_token(&token).await,
            Err(AuthError::InvalidToken(_))
        ));

        let token = sign(&claims_for(&"u".repeat(129)), Some("test-key-1"));
        assert!(matches!(
            auth().verify_id_token(&token).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_or_unknown_kid() {
        let token = sign(&claims_for("user-1"), None);
        assert!(matches!(
            auth().verify_id_token(&token).await,
            Err(AuthError::InvalidToken(_))
        ));

        let token = sign(&claims_for("user-1"), Some("rotated"));
        let err = auth().verify_id_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownKey(_)));
        assert_eq!(err.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let err = auth()
            .check_authorization(Some("Bearer not.a.jwt"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }
}
