//! Document backend boundary.
//!
//! A [`DocumentBackend`] is one live session against the document store. The
//! store never constructs sessions itself; a [`Connector`](crate::Connector)
//! does.

use crate::error::BackendError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Document fields as a JSON object.
pub type Fields = Map<String, Value>;

/// A document read from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document ID, the last path segment
    pub id: String,
    /// Decoded fields
    pub fields: Fields,
    /// Creation time
    pub create_time: Option<DateTime<Utc>>,
    /// Last update time
    pub update_time: Option<DateTime<Utc>>,
}

impl Document {
    /// Create a document without timestamps.
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
            create_time: None,
            update_time: None,
        }
    }

    /// Deserialize the fields into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields do not match `T`.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }

    /// One field by name.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Reference to a created document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Collection name
    pub collection: String,
    /// Generated document ID
    pub id: String,
}

impl DocumentRef {
    /// Path relative to the database root.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Commit time, when the backend reports one
    pub update_time: Option<DateTime<Utc>>,
}

/// One session against the document store.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Create a document with a generated ID.
    async fn add(&self, collection: &str, fields: &Fields) -> Result<DocumentRef, BackendError>;

    /// Read one document.
    async fn get(&self, collection: &str, id: &str) -> Result<Document, BackendError>;

    /// Write the given top-level fields, leaving the others untouched.
    /// Creates the document when missing.
    async fn set_merge(&self, collection: &str, id: &str, fields: &Fields) -> Result<WriteResult, BackendError>;

    /// Delete one document. Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<WriteResult, BackendError>;

    /// Forward-only cursor over every document of a collection.
    fn documents(&self, collection: &str) -> Box<dyn DocumentCursor>;

    /// Release the session. Later calls may fail.
    async fn close(&self);
}

/// Forward-only document cursor.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Collection being read.
    fn collection(&self) -> &str;

    /// Next document, or [`BackendError::Done`] once exhausted.
    async fn next(&mut self) -> Result<Document, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct PromoItem {
        code: String,
        discount: u32,
    }

    #[test]
    fn test_document_data() {
        let fields = serde_json::json!({"code": "SPRING", "discount": 15});
        let Value::Object(fields) = fields else {
            unreachable!()
        };
        let doc = Document::new("p-1", fields);

        let item: PromoItem = doc.data().unwrap();
        assert_eq!(
            item,
            PromoItem {
                code: "SPRING".to_string(),
                discount: 15
            }
        );
        assert_eq!(doc.get("discount"), Some(&serde_json::json!(15)));
    }

    #[test]
    fn test_document_data_mismatch() {
        let doc = Document::new("p-2", Fields::new());
        assert!(doc.data::<PromoItem>().is_err());
    }

    #[test]
    fn test_ref_path() {
        let doc_ref = DocumentRef {
            collection: "users".to_string(),
            id: "abc".to_string(),
        };
        assert_eq!(doc_ref.path(), "users/abc");
    }
}
