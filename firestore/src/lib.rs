//! Firestore CRUD helpers for cloud functions.
//!
//! Every operation runs a bounded retry loop: transient transport errors
//! (the service dropping the connection or being temporarily unavailable)
//! refresh the caller's session and retry, up to a budget read from
//! `FIRESTORE_RETRIES_NUMBER` on each call. Other errors surface at once.
//!
//! ```no_run
//! use cloudfn_firestore::{FirestoreConfig, FirestoreStore, RestConnector};
//!
//! # async fn run() -> Result<(), cloudfn_firestore::FirestoreError> {
//! let store = FirestoreStore::new(RestConnector::new(FirestoreConfig::default())?);
//! let mut session = store.connect().await?;
//! let doc = store.get_entity(&mut session, "users", "u-1").await?;
//! # let _ = doc;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allowlist;
pub mod backend;
pub mod classifier;
pub mod config;
pub mod error;
pub mod rest;
pub mod session;
pub mod store;
pub mod value;

pub use allowlist::{
    CollectionAllowlist, PROMO_ITEMS_COLLECTION, SHIPPING_SECRET_COLLECTION, USERS_COLLECTION,
};
pub use backend::{Document, DocumentBackend, DocumentCursor, DocumentRef, Fields, WriteResult};
pub use classifier::{ErrorClass, ErrorClassifier, TransientErrorClassifier};
pub use config::{FirestoreConfig, RETRIES_ENV_VAR};
pub use error::{BackendError, FirestoreError, FirestoreResult, Operation, StatusCode};
pub use rest::{RestConnector, RestSession};
pub use session::{Connector, refresh};
pub use store::FirestoreStore;
