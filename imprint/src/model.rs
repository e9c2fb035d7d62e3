//! Stored Imprint Engine models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shipping credentials of one fulfilment center.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingSecretData {
    /// Document ID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Key name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_name: String,
    /// Secret Manager secret holding the refresh token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_name: String,
    /// Current access token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    /// When the access token stops being usable, stored as a Firestore timestamp
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "cloudfn_firestore::value::timestamp"
    )]
    pub token_expiration_date: Option<DateTime<Utc>>,
}

impl ShippingSecretData {
    /// Whether the stored token must be renewed at `now`. A missing
    /// expiration counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.token_expiration_date.is_none_or(|t| t < now)
    }
}

impl fmt::Debug for ShippingSecretData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShippingSecretData")
            .field("id", &self.id)
            .field("key_name", &self.key_name)
            .field("secret_name", &self.secret_name)
            .field("access_token", &"[REDACTED]")
            .field("token_expiration_date", &self.token_expiration_date)
            .finish()
    }
}

/// Warehouse application lookup response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseAppId {
    /// Application ID
    pub app_id: i64,
}
