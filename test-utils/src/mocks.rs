//! Scripted implementations of the backend and sink traits.
//!
//! [`ScriptedConnector`] hands out [`ScriptedSession`]s that share one
//! in-memory document map and one failure script. Each backend call first
//! consumes the script, then falls through to the in-memory map, so tests can
//! say "fail twice with a transient error, then behave".

use async_trait::async_trait;
use cloudfn_common::{LogEntry, LogSink, PlatformError};
use cloudfn_firestore::{
    BackendError, Connector, Document, DocumentBackend, DocumentCursor, DocumentRef, Fields, StatusCode,
    WriteResult,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct ScriptState {
    failures: Mutex<VecDeque<BackendError>>,
    persistent_failure: Mutex<Option<BackendError>>,
    connect_failures: Mutex<VecDeque<BackendError>>,
    documents: Mutex<BTreeMap<String, BTreeMap<String, Fields>>>,
    calls: AtomicU32,
    connects: AtomicU32,
    closes: AtomicU32,
    next_id: AtomicU32,
    generations_seen: Mutex<Vec<u32>>,
}

impl ScriptState {
    fn begin_call(&self, generation: u32) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.generations_seen).push(generation);
        if let Some(err) = lock(&self.failures).pop_front() {
            return Err(err);
        }
        if let Some(err) = lock(&self.persistent_failure).clone() {
            return Err(err);
        }
        Ok(())
    }
}

/// Connector producing scripted sessions.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<ScriptState>,
}

impl ScriptedConnector {
    /// Create a connector with an empty store and no failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next backend call with `err`.
    #[must_use]
    pub fn fail_next(self, err: BackendError) -> Self {
        lock(&self.state.failures).push_back(err);
        self
    }

    /// Fail the next `times` backend calls with `err`.
    #[must_use]
    pub fn fail_times(self, times: u32, err: &BackendError) -> Self {
        {
            let mut failures = lock(&self.state.failures);
            for _ in 0..times {
                failures.push_back(err.clone());
            }
        }
        self
    }

    /// Fail every backend call with `err` once the script is consumed.
    #[must_use]
    pub fn fail_always(self, err: BackendError) -> Self {
        *lock(&self.state.persistent_failure) = Some(err);
        self
    }

    /// Fail the next connect with `err`.
    #[must_use]
    pub fn fail_next_connect(self, err: BackendError) -> Self {
        lock(&self.state.connect_failures).push_back(err);
        self
    }

    /// Store a document.
    #[must_use]
    pub fn with_document(self, collection: &str, id: &str, fields: Fields) -> Self {
        lock(&self.state.documents)
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        self
    }

    /// Stored fields of a document.
    #[must_use]
    pub fn document(&self, collection: &str, id: &str) -> Option<Fields> {
        lock(&self.state.documents)
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Number of stored documents in a collection.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        lock(&self.state.documents).get(collection).map_or(0, BTreeMap::len)
    }

    /// Backend calls made, failed or not. Cursor reads are not counted.
    #[must_use]
    pub fn backend_calls(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Successful connects.
    #[must_use]
    pub fn connects(&self) -> u32 {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Sessions closed.
    #[must_use]
    pub fn closes(&self) -> u32 {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Session generation used by each backend call, in order.
    #[must_use]
    pub fn generations_seen(&self) -> Vec<u32> {
        lock(&self.state.generations_seen).clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Session = ScriptedSession;

    async fn connect(&self) -> Result<ScriptedSession, BackendError> {
        if let Some(err) = lock(&self.state.connect_failures).pop_front() {
            return Err(err);
        }
        let generation = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ScriptedSession {
            generation,
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Session produced by [`ScriptedConnector`].
pub struct ScriptedSession {
    generation: u32,
    state: Arc<ScriptState>,
    closed: AtomicBool,
}

impl ScriptedSession {
    /// Connect number that produced this session, starting at one.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Whether the session was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentBackend for ScriptedSession {
    async fn add(&self, collection: &str, fields: &Fields) -> Result<DocumentRef, BackendError> {
        self.state.begin_call(self.generation)?;
        let id = format!("doc-{}", self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        lock(&self.state.documents)
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields.clone());
        Ok(DocumentRef {
            collection: collection.to_string(),
            id,
        })
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Document, BackendError> {
        self.state.begin_call(self.generation)?;
        lock(&self.state.documents)
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone()))
            .ok_or_else(|| {
                BackendError::status(StatusCode::NotFound, format!("no document {collection}/{id}"))
            })
    }

    async fn set_merge(&self, collection: &str, id: &str, fields: &Fields) -> Result<WriteResult, BackendError> {
        self.state.begin_call(self.generation)?;
        let mut documents = lock(&self.state.documents);
        let stored = documents
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        for (key, value) in fields {
            stored.insert(key.clone(), value.clone());
        }
        Ok(WriteResult::default())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<WriteResult, BackendError> {
        self.state.begin_call(self.generation)?;
        if let Some(docs) = lock(&self.state.documents).get_mut(collection) {
            docs.remove(id);
        }
        Ok(WriteResult::default())
    }

    fn documents(&self, collection: &str) -> Box<dyn DocumentCursor> {
        let docs = lock(&self.state.documents)
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Ok(Document::new(id.clone(), fields.clone())))
                    .collect()
            })
            .unwrap_or_default();
        Box::new(ScriptedCursor::new(collection, docs))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Cursor replaying scripted steps, then [`BackendError::Done`].
pub struct ScriptedCursor {
    collection: String,
    steps: VecDeque<Result<Document, BackendError>>,
    calls: Arc<AtomicU32>,
}

impl ScriptedCursor {
    /// Create a cursor over `steps`.
    #[must_use]
    pub fn new(collection: &str, steps: Vec<Result<Document, BackendError>>) -> Self {
        Self {
            collection: collection.to_string(),
            steps: steps.into(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Shared counter of `next` calls, readable after the cursor is moved.
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }
}

#[async_trait]
impl DocumentCursor for ScriptedCursor {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn next(&mut self) -> Result<Document, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.steps.pop_front().unwrap_or(Err(BackendError::Done))
    }
}

/// Log sink keeping every shipped batch.
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<LogEntry>>>,
    failing: AtomicBool,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make later shipments fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Shipped batches.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<LogEntry>> {
        lock(&self.batches).clone()
    }

    /// Every shipped entry, flattened.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        lock(&self.batches).iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn write_entries(&self, _log_name: &str, entries: &[LogEntry]) -> Result<(), PlatformError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PlatformError::unavailable("recording sink set to fail"));
        }
        lock(&self.batches).push(entries.to_vec());
        Ok(())
    }
}
