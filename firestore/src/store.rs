//! Retry-bounded CRUD operations.
//!
//! Every operation validates its arguments, checks the collection against
//! the allowlist and then runs one bounded loop: call the backend, classify a
//! failure, refresh the caller's session on transient errors and try again.
//! The budget is resolved on every call, so a changed environment value takes
//! effect without a restart.
//!
//! Each retry re-issues the whole operation. Creating is not idempotent, so a
//! create whose response was lost can leave a duplicate document behind.

use crate::allowlist::CollectionAllowlist;
use crate::backend::{Document, DocumentBackend, DocumentCursor, DocumentRef, Fields, WriteResult};
use crate::classifier::{ErrorClass, ErrorClassifier, TransientErrorClassifier};
use crate::config::RETRIES_ENV_VAR;
use crate::error::{BackendError, FirestoreError, FirestoreResult, Operation};
use crate::session::{Connector, refresh};
use async_trait::async_trait;
use cloudfn_common::{Backoff, NoBackoff, RetryBudget, RetryMetrics};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// One backend call, re-issued by the retry loop.
#[async_trait]
trait StoreCall: Sync {
    type Output: Send;

    fn operation(&self) -> Operation;

    fn collection(&self) -> &str;

    fn id(&self) -> Option<&str>;

    async fn invoke<B: DocumentBackend>(&self, backend: &B) -> Result<Self::Output, BackendError>;
}

struct AddCall<'a> {
    collection: &'a str,
    fields: Fields,
}

#[async_trait]
impl StoreCall for AddCall<'_> {
    type Output = DocumentRef;

    fn operation(&self) -> Operation {
        Operation::Add
    }

    fn collection(&self) -> &str {
        self.collection
    }

    fn id(&self) -> Option<&str> {
        None
    }

    async fn invoke<B: DocumentBackend>(&self, backend: &B) -> Result<DocumentRef, BackendError> {
        backend.add(self.collection, &self.fields).await
    }
}

struct GetCall<'a> {
    collection: &'a str,
    id: &'a str,
}

#[async_trait]
impl StoreCall for GetCall<'_> {
    type Output = Document;

    fn operation(&self) -> Operation {
        Operation::Get
    }

    fn collection(&self) -> &str {
        self.collection
    }

    fn id(&self) -> Option<&str> {
        Some(self.id)
    }

    async fn invoke<B: DocumentBackend>(&self, backend: &B) -> Result<Document, BackendError> {
        backend.get(self.collection, self.id).await
    }
}

struct EditCall<'a> {
    collection: &'a str,
    id: &'a str,
    fields: Fields,
}

#[async_trait]
impl StoreCall for EditCall<'_> {
    type Output = WriteResult;

    fn operation(&self) -> Operation {
        Operation::Edit
    }

    fn collection(&self) -> &str {
        self.collection
    }

    fn id(&self) -> Option<&str> {
        Some(self.id)
    }

    async fn invoke<B: DocumentBackend>(&self, backend: &B) -> Result<WriteResult, BackendError> {
        backend.set_merge(self.collection, self.id, &self.fields).await
    }
}

struct DeleteCall<'a> {
    collection: &'a str,
    id: &'a str,
}

#[async_trait]
impl StoreCall for DeleteCall<'_> {
    type Output = WriteResult;

    fn operation(&self) -> Operation {
        Operation::Delete
    }

    fn collection(&self) -> &str {
        self.collection
    }

    fn id(&self) -> Option<&str> {
        Some(self.id)
    }

    async fn invoke<B: DocumentBackend>(&self, backend: &B) -> Result<WriteResult, BackendError> {
        backend.delete(self.collection, self.id).await
    }
}

/// Firestore CRUD helpers with retry and session refresh.
///
/// The store holds no session. Callers own theirs and pass it as `&mut`; a
/// refresh inside any call replaces it in place, so later calls use the new
/// session.
pub struct FirestoreStore<C: Connector> {
    connector: C,
    allowlist: CollectionAllowlist,
    budget: RetryBudget,
    classifier: Arc<dyn ErrorClassifier>,
    backoff: Arc<dyn Backoff>,
    metrics: Arc<RetryMetrics>,
}

impl<C: Connector> FirestoreStore<C> {
    /// Create a store with the default allowlist, a budget read from
    /// `FIRESTORE_RETRIES_NUMBER`, and no backoff.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            allowlist: CollectionAllowlist::default(),
            budget: RetryBudget::from_env_var(RETRIES_ENV_VAR),
            classifier: Arc::new(TransientErrorClassifier),
            backoff: Arc::new(NoBackoff),
            metrics: Arc::new(RetryMetrics::new("firestore")),
        }
    }

    /// Replace the allowlist.
    #[must_use]
    pub fn with_allowlist(mut self, allowlist: CollectionAllowlist) -> Self {
        self.allowlist = allowlist;
        self
    }

    /// Replace the retry budget.
    #[must_use]
    pub fn with_budget(mut self, budget: RetryBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Replace the error classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Pause between attempts.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Share counters with other components.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<RetryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Allowlist in effect.
    pub const fn allowlist(&self) -> &CollectionAllowlist {
        &self.allowlist
    }

    /// Retry counters.
    pub fn metrics(&self) -> &RetryMetrics {
        &self.metrics
    }

    /// Connector used for refreshes.
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Open an initial session.
    ///
    /// # Errors
    ///
    /// Returns [`FirestoreError::Connect`] if the connector fails.
    pub async fn connect(&self) -> FirestoreResult<C::Session> {
        self.connector.connect().await.map_err(FirestoreError::Connect)
    }

    /// Add `entity` to `collection` under a generated ID.
    ///
    /// # Errors
    ///
    /// Validation errors when `entity` does not serialize to a map or the
    /// collection is not allowed; otherwise the loop outcome.
    #[instrument(skip(self, session, entity))]
    pub async fn add_entity<T>(
        &self,
        session: &mut C::Session,
        collection: &str,
        entity: &T,
    ) -> FirestoreResult<DocumentRef>
    where
        T: Serialize + ?Sized + Sync,
    {
        let fields = entity_fields(entity, "add")?;
        self.allowlist.ensure(collection)?;
        self.run(session, &AddCall { collection, fields }).await
    }

    /// Read document `id` from `collection`.
    ///
    /// # Errors
    ///
    /// Validation errors for an empty ID or a disallowed collection; otherwise
    /// the loop outcome. A missing document is a [`FirestoreError::Backend`]
    /// for which [`FirestoreError::is_not_found`] holds.
    #[instrument(skip(self, session))]
    pub async fn get_entity(
        &self,
        session: &mut C::Session,
        collection: &str,
        id: &str,
    ) -> FirestoreResult<Document> {
        require_id(id, "get")?;
        self.allowlist.ensure(collection)?;
        self.run(session, &GetCall { collection, id }).await
    }

    /// Merge the top-level fields of `entity` into document `id`, creating it
    /// when missing.
    ///
    /// # Errors
    ///
    /// Validation errors for an empty ID, an entity that is not a non-empty
    /// map, or a disallowed collection; otherwise the loop outcome.
    #[instrument(skip(self, session, entity))]
    pub async fn edit_entity<T>(
        &self,
        session: &mut C::Session,
        collection: &str,
        id: &str,
        entity: &T,
    ) -> FirestoreResult<WriteResult>
    where
        T: Serialize + ?Sized + Sync,
    {
        require_id(id, "edit")?;
        let fields = entity_fields(entity, "edit")?;
        if fields.is_empty() {
            return Err(FirestoreError::validation("entity has no fields to merge"));
        }
        self.allowlist.ensure(collection)?;
        self.run(session, &EditCall { collection, id, fields }).await
    }

    /// Delete document `id` from `collection`.
    ///
    /// # Errors
    ///
    /// Validation errors for an empty ID or a disallowed collection; otherwise
    /// the loop outcome.
    #[instrument(skip(self, session))]
    pub async fn delete_entity(
        &self,
        session: &mut C::Session,
        collection: &str,
        id: &str,
    ) -> FirestoreResult<WriteResult> {
        require_id(id, "deletion")?;
        self.allowlist.ensure(collection)?;
        self.run(session, &DeleteCall { collection, id }).await
    }

    /// Cursor over every document of `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`FirestoreError::UnknownCollection`] for a disallowed name.
    pub fn documents(&self, session: &C::Session, collection: &str) -> FirestoreResult<Box<dyn DocumentCursor>> {
        self.allowlist.ensure(collection)?;
        Ok(session.documents(collection))
    }

    /// Advance `cursor`, retrying transient errors on the same cursor.
    ///
    /// A cursor is bound to the session that opened it, so no refresh happens
    /// here.
    ///
    /// # Errors
    ///
    /// [`FirestoreError::Done`] once the cursor is exhausted; otherwise the
    /// loop outcome.
    pub async fn next_document(&self, cursor: &mut dyn DocumentCursor) -> FirestoreResult<Document> {
        let bound = self.budget.resolve();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.metrics.attempts.inc();
            let error = match cursor.next().await {
                Ok(doc) => return Ok(doc),
                Err(e) => e,
            };

            match self.classifier.classify(&error) {
                ErrorClass::EndOfSequence => return Err(FirestoreError::Done),
                ErrorClass::Fatal => {
                    self.metrics.fatal.inc();
                    return Err(FirestoreError::Backend {
                        operation: Operation::Iterate,
                        collection: cursor.collection().to_string(),
                        id: None,
                        source: error,
                    });
                }
                ErrorClass::Retryable => {
                    info!(
                        collection = cursor.collection(),
                        attempt,
                        budget = bound,
                        error = %error,
                        "Document iteration failed, will retry"
                    );
                    if attempt >= bound {
                        self.metrics.exhausted.inc();
                        return Err(FirestoreError::RetriesExhausted {
                            operation: Operation::Iterate,
                            collection: cursor.collection().to_string(),
                            id: None,
                            attempts: bound,
                            source: error,
                        });
                    }
                    self.pause(attempt - 1).await;
                }
            }
        }
    }

    async fn run<Op: StoreCall>(&self, session: &mut C::Session, call: &Op) -> FirestoreResult<Op::Output> {
        let bound = self.budget.resolve();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.metrics.attempts.inc();
            let error = match call.invoke(&*session).await {
                Ok(output) => {
                    debug!(operation = %call.operation(), attempt, "Firestore call succeeded");
                    return Ok(output);
                }
                Err(e) => e,
            };

            match self.classifier.classify(&error) {
                ErrorClass::EndOfSequence => return Err(FirestoreError::Done),
                ErrorClass::Fatal => {
                    self.metrics.fatal.inc();
                    return Err(FirestoreError::Backend {
                        operation: call.operation(),
                        collection: call.collection().to_string(),
                        id: call.id().map(str::to_string),
                        source: error,
                    });
                }
                ErrorClass::Retryable => {
                    info!(
                        operation = %call.operation(),
                        collection = call.collection(),
                        id = call.id().unwrap_or_default(),
                        attempt,
                        budget = bound,
                        error = %error,
                        "Firestore call failed, will retry"
                    );

                    if let Err(source) = refresh(&self.connector, session).await {
                        return Err(FirestoreError::RefreshFailed {
                            retries_left: bound + 1 - attempt,
                            source,
                        });
                    }
                    self.metrics.refreshes.inc();

                    if attempt >= bound {
                        self.metrics.exhausted.inc();
                        return Err(FirestoreError::RetriesExhausted {
                            operation: call.operation(),
                            collection: call.collection().to_string(),
                            id: call.id().map(str::to_string),
                            attempts: bound,
                            source: error,
                        });
                    }
                    self.pause(attempt - 1).await;
                }
            }
        }
    }

    async fn pause(&self, attempt: u32) {
        let delay = self.backoff.delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn require_id(id: &str, action: &str) -> FirestoreResult<()> {
    if id.is_empty() {
        return Err(FirestoreError::Validation(format!(
            "entity ID is required field for {action}"
        )));
    }
    Ok(())
}

fn entity_fields<T: Serialize + ?Sized>(entity: &T, action: &str) -> FirestoreResult<Fields> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(Value::Null) => Err(FirestoreError::Validation(format!(
            "entity is required field for {action}"
        ))),
        Ok(_) => Err(FirestoreError::Validation(format!(
            "entity for {action} must serialize to a map"
        ))),
        Err(e) => Err(FirestoreError::Validation(format!(
            "entity for {action} cannot be serialized: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Script {
        replies: Mutex<VecDeque<Result<(), BackendError>>>,
        calls: AtomicU32,
    }

    impl Script {
        fn next(&self) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    struct StubSession {
        script: Arc<Script>,
        generation: u32,
    }

    #[async_trait]
    impl DocumentBackend for StubSession {
        async fn add(&self, collection: &str, _: &Fields) -> Result<DocumentRef, BackendError> {
            self.script.next()?;
            Ok(DocumentRef {
                collection: collection.to_string(),
                id: format!("gen-{}", self.generation),
            })
        }

        async fn get(&self, _: &str, id: &str) -> Result<Document, BackendError> {
            self.script.next()?;
            Ok(Document::new(id, Fields::new()))
        }

        async fn set_merge(&self, _: &str, _: &str, _: &Fields) -> Result<WriteResult, BackendError> {
            self.script.next()?;
            Ok(WriteResult::default())
        }

        async fn delete(&self, _: &str, _: &str) -> Result<WriteResult, BackendError> {
            self.script.next()?;
            Ok(WriteResult::default())
        }

        fn documents(&self, _: &str) -> Box<dyn DocumentCursor> {
            unimplemented!()
        }

        async fn close(&self) {}
    }

    struct StubConnector {
        script: Arc<Script>,
        connects: AtomicU32,
    }

    #[async_trait]
    impl Connector for StubConnector {
        type Session = StubSession;

        async fn connect(&self) -> Result<StubSession, BackendError> {
            let generation = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(StubSession {
                script: self.script.clone(),
                generation,
            })
        }
    }

    fn store(replies: Vec<Result<(), BackendError>>, budget: u32) -> (FirestoreStore<StubConnector>, Arc<Script>) {
        let script = Arc::new(Script {
            replies: Mutex::new(replies.into()),
            calls: AtomicU32::new(0),
        });
        let connector = StubConnector {
            script: script.clone(),
            connects: AtomicU32::new(0),
        };
        (
            FirestoreStore::new(connector).with_budget(RetryBudget::Fixed(budget)),
            script,
        )
    }

    fn transient() -> Result<(), BackendError> {
        Err(BackendError::unavailable("transport is closing"))
    }

    #[tokio::test]
    async fn test_add_retries_then_succeeds_on_new_session() {
        let (store, script) = store(vec![transient(), transient()], 3);
        let mut session = store.connect().await.unwrap();

        let doc_ref = store
            .add_entity(&mut session, "users", &serde_json::json!({"name": "Ada"}))
            .await
            .unwrap();

        assert_eq!(script.calls.load(Ordering::SeqCst), 3);
        assert_eq!(session.generation, 3);
        assert_eq!(doc_ref.id, "gen-3");
        assert_eq!(store.metrics().refreshes.get(), 2);
        assert_eq!(store.metrics().attempts.get(), 3);
    }

    #[tokio::test]
    async fn test_null_entity_rejected() {
        let (store, script) = store(vec![], 3);
        let mut session = store.connect().await.unwrap();

        let err = store
            .add_entity(&mut session, "users", &Option::<u32>::None)
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(err.to_string(), "entity is required field for add");
        assert_eq!(script.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scalar_entity_rejected() {
        let (store, _) = store(vec![], 1);
        let mut session = store.connect().await.unwrap();

        let err = store.add_entity(&mut session, "users", &42).await.unwrap_err();
        assert!(matches!(err, FirestoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_id_checked_before_collection() {
        let (store, _) = store(vec![], 1);
        let mut session = store.connect().await.unwrap();

        let err = store.get_entity(&mut session, "nope", "").await.unwrap_err();
        assert_eq!(err.to_string(), "entity ID is required field for get");
    }

    #[tokio::test]
    async fn test_empty_edit_rejected() {
        let (store, script) = store(vec![], 1);
        let mut session = store.connect().await.unwrap();

        let err = store
            .edit_entity(&mut session, "users", "u-1", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(script.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let (store, script) = store(vec![Err(BackendError::other("permission denied"))], 5);
        let mut session = store.connect().await.unwrap();

        let err = store.delete_entity(&mut session, "promo_items", "p-1").await.unwrap_err();

        assert!(matches!(
            err,
            FirestoreError::Backend {
                operation: Operation::Delete,
                ..
            }
        ));
        assert_eq!(script.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.generation, 1);
        assert_eq!(store.metrics().fatal.get(), 1);
    }

    #[tokio::test]
    async fn test_done_from_crud_is_unwrapped() {
        let (store, _) = store(vec![Err(BackendError::Done)], 2);
        let mut session = store.connect().await.unwrap();

        let err = store.get_entity(&mut session, "users", "u-1").await.unwrap_err();
        assert!(err.is_done());
    }
}
