//! Allowlist of collection names the store may touch.

use crate::error::FirestoreError;
use std::collections::BTreeSet;

/// Users collection.
pub const USERS_COLLECTION: &str = "users";
/// Promo items collection.
pub const PROMO_ITEMS_COLLECTION: &str = "promo_items";
/// Shipping credentials collection.
pub const SHIPPING_SECRET_COLLECTION: &str = "fc_shipping_secret_data";

/// Set of collection names, fixed when the store is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionAllowlist {
    names: BTreeSet<String>,
}

impl CollectionAllowlist {
    /// Build an allowlist from names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    /// Whether `name` is allowed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Reject names that are not allowed.
    ///
    /// # Errors
    ///
    /// Returns [`FirestoreError::UnknownCollection`] when `name` is absent.
    pub fn ensure(&self, name: &str) -> Result<(), FirestoreError> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(FirestoreError::UnknownCollection(name.to_string()))
        }
    }

    /// Allowed names, sorted.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of allowed names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing is allowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for CollectionAllowlist {
    fn default() -> Self {
        Self::new([USERS_COLLECTION, PROMO_ITEMS_COLLECTION, SHIPPING_SECRET_COLLECTION])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let allowlist = CollectionAllowlist::default();
        assert!(allowlist.contains("users"));
        assert!(allowlist.contains("promo_items"));
        assert!(allowlist.contains("fc_shipping_secret_data"));
        assert!(!allowlist.contains("Users"));
        assert_eq!(allowlist.len(), 3);
    }

    #[test]
    fn test_ensure() {
        let allowlist = CollectionAllowlist::new(["orders"]).with("invoices");
        assert!(allowlist.ensure("invoices").is_ok());

        let err = allowlist.ensure("order").unwrap_err();
        assert!(matches!(err, FirestoreError::UnknownCollection(ref name) if name == "order"));
        assert_eq!(err.to_string(), "collection name 'order' does not exist");
    }

    #[test]
    fn test_empty_allowlist_rejects_everything() {
        let allowlist = CollectionAllowlist::new(Vec::<String>::new());
        assert!(allowlist.is_empty());
        assert!(allowlist.ensure("users").is_err());
    }
}
