//! Sample entities.

use chrono::{DateTime, Utc};
use cloudfn_firestore::Fields;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Sample user document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleUser {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// Subscription plan
    pub plan: String,
}

impl SampleUser {
    /// A user on the free plan.
    #[must_use]
    pub fn free(name: &str) -> Self {
        Self {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            plan: "free".to_string(),
        }
    }
}

/// Sample promo item document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SamplePromoItem {
    /// Promo code
    pub code: String,
    /// Discount in percent
    pub discount: u32,
    /// End of validity
    pub valid_until: DateTime<Utc>,
}

impl SamplePromoItem {
    /// A promo valid for another week.
    #[must_use]
    pub fn active(code: &str, discount: u32) -> Self {
        Self {
            code: code.to_string(),
            discount,
            valid_until: Utc::now() + chrono::Duration::days(7),
        }
    }
}

/// Stored shipping credentials whose access token expires at `expires_at`.
#[must_use]
pub fn shipping_secret_fields(
    id: &str,
    secret_name: &str,
    access_token: &str,
    expires_at: DateTime<Utc>,
) -> Fields {
    let value = json!({
        "id": id,
        "key_name": format!("{id}-key"),
        "secret_name": secret_name,
        "access_token": access_token,
        "token_expiration_date": expires_at.to_rfc3339(),
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => Fields::new(),
    }
}
