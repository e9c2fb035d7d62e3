//! Claims of a Firebase ID token.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Decoded and verified Firebase ID token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirebaseToken {
    /// Issuer, `https://securetoken.google.com/<project>`
    pub iss: String,
    /// Audience, the project ID
    pub aud: String,
    /// Subject, the user ID
    pub sub: String,
    /// Expiry, seconds since the epoch
    pub exp: i64,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// When the user signed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the email address is verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Sign-in provider details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase: Option<Value>,
    /// Custom claims
    #[serde(flatten)]
    pub claims: HashMap<String, Value>,
}

impl FirebaseToken {
    /// Firebase user ID.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.sub
    }

    /// Custom claim by name.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}
