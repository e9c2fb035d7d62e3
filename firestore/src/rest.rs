//! Firestore REST adapter.
//!
//! Each [`RestConnector::connect`] builds a new HTTP client, so a refreshed
//! session shares no connections with the one it replaces. Access tokens come
//! from the connector's token source on every request; a `401` answer drops
//! the cached token and the request is sent once more with a new one.

use crate::backend::{Document, DocumentBackend, DocumentCursor, DocumentRef, Fields, WriteResult};
use crate::config::FirestoreConfig;
use crate::error::{BackendError, FirestoreError, StatusCode};
use crate::session::Connector;
use crate::value::{RestDocument, encode_fields, quote_field_path};
use async_trait::async_trait;
use cloudfn_common::{
    AccessTokenSource, HttpConfig, MetadataTokenSource, PlatformError, StaticTokenSource, build_http_client,
};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument};

/// Token the emulator accepts for full access.
const EMULATOR_TOKEN: &str = "owner";

/// Connector for the Firestore REST API.
pub struct RestConnector {
    config: FirestoreConfig,
    root: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl RestConnector {
    /// Create a connector from configuration. Emulator configurations use the
    /// emulator's owner token; others use the metadata server.
    ///
    /// # Errors
    ///
    /// Returns [`FirestoreError::Config`] without a project or when the token
    /// source cannot be built.
    pub fn new(config: FirestoreConfig) -> Result<Self, FirestoreError> {
        let tokens: Arc<dyn AccessTokenSource> = if config.emulator {
            Arc::new(StaticTokenSource::new(EMULATOR_TOKEN))
        } else {
            Arc::new(MetadataTokenSource::from_env().map_err(|e| FirestoreError::Config(e.to_string()))?)
        };
        Self::with_token_source(config, tokens)
    }

    /// Create a connector with an explicit token source.
    ///
    /// # Errors
    ///
    /// Returns [`FirestoreError::Config`] without a project.
    pub fn with_token_source(
        config: FirestoreConfig,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, FirestoreError> {
        let root = config.documents_root()?;
        Ok(Self { config, root, tokens })
    }

    /// Documents root URL.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }
}

#[async_trait]
impl Connector for RestConnector {
    type Session = RestSession;

    #[instrument(skip(self))]
    async fn connect(&self) -> Result<RestSession, BackendError> {
        let http = build_http_client(&HttpConfig::default().with_timeout(self.config.timeout))
            .map_err(|e| BackendError::other(format!("failed to create HTTP client: {e}")))?;
        // credentials are checked at connect time
        self.tokens.access_token().await.map_err(platform_to_backend)?;
        debug!(root = %self.root, "Opened firestore session");

        Ok(RestSession {
            inner: Arc::new(SessionInner {
                http,
                root: self.root.clone(),
                tokens: self.tokens.clone(),
                page_size: self.config.page_size,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

struct SessionInner {
    http: Client,
    root: String,
    tokens: Arc<dyn AccessTokenSource>,
    page_size: u32,
    closed: AtomicBool,
}

impl SessionInner {
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, BackendError> {
        let mut url = reqwest::Url::parse(&self.root)
            .map_err(|e| BackendError::other(format!("invalid firestore root '{}': {e}", self.root)))?;
        url.path_segments_mut()
            .map_err(|()| BackendError::other("firestore root cannot take path segments"))?
            .extend(segments);
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: reqwest::Url,
        body: Option<&Value>,
    ) -> Result<T, BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::status(StatusCode::FailedPrecondition, "session is closed"));
        }

        let mut renewed = false;
        loop {
            let token = self.tokens.access_token().await.map_err(platform_to_backend)?;
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(token.secret());
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(transport_error)?;
            if response.status() == reqwest::StatusCode::UNAUTHORIZED && !renewed {
                debug!("Access token rejected, fetching a new one");
                self.tokens.invalidate().await;
                renewed = true;
                continue;
            }

            let response = check_status(response).await?;
            return response
                .json::<T>()
                .await
                .map_err(|e| BackendError::other(format!("invalid firestore response: {e}")));
        }
    }
}

/// One Firestore REST session.
#[derive(Clone)]
pub struct RestSession {
    inner: Arc<SessionInner>,
}

impl RestSession {
    /// Whether [`close`](DocumentBackend::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentBackend for RestSession {
    #[instrument(skip(self, fields))]
    async fn add(&self, collection: &str, fields: &Fields) -> Result<DocumentRef, BackendError> {
        let url = self.inner.url(&[collection])?;
        let body = json!({ "fields": encode_fields(fields) });
        let doc: RestDocument = self.inner.call(Method::POST, url, Some(&body)).await?;
        let doc = doc.into_document()?;
        Ok(DocumentRef {
            collection: collection.to_string(),
            id: doc.id,
        })
    }

    #[instrument(skip(self))]
    async fn get(&self, collection: &str, id: &str) -> Result<Document, BackendError> {
        let url = self.inner.url(&[collection, id])?;
        let doc: RestDocument = self.inner.call(Method::GET, url, None).await?;
        doc.into_document()
    }

    #[instrument(skip(self, fields))]
    async fn set_merge(&self, collection: &str, id: &str, fields: &Fields) -> Result<WriteResult, BackendError> {
        let mut url = self.inner.url(&[collection, id])?;
        {
            let mut query = url.query_pairs_mut();
            for name in fields.keys() {
                query.append_pair("updateMask.fieldPaths", &quote_field_path(name));
            }
        }
        let body = json!({ "fields": encode_fields(fields) });
        let doc: RestDocument = self.inner.call(Method::PATCH, url, Some(&body)).await?;
        Ok(WriteResult {
            update_time: doc.update_time,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, collection: &str, id: &str) -> Result<WriteResult, BackendError> {
        let url = self.inner.url(&[collection, id])?;
        let _: Value = self.inner.call(Method::DELETE, url, None).await?;
        Ok(WriteResult::default())
    }

    fn documents(&self, collection: &str) -> Box<dyn DocumentCursor> {
        Box::new(RestCursor {
            session: self.inner.clone(),
            collection: collection.to_string(),
            buffered: VecDeque::new(),
            next_page_token: None,
            started: false,
        })
    }

    async fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!(root = %self.inner.root, "Closed firestore session");
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RestDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Paged cursor over a collection.
struct RestCursor {
    session: Arc<SessionInner>,
    collection: String,
    buffered: VecDeque<Document>,
    next_page_token: Option<String>,
    started: bool,
}

impl RestCursor {
    async fn fetch_page(&mut self) -> Result<(), BackendError> {
        let mut url = self.session.url(&[&self.collection])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &self.session.page_size.to_string());
            if let Some(token) = &self.next_page_token {
                query.append_pair("pageToken", token);
            }
        }
        let page: ListResponse = self.session.call(Method::GET, url, None).await?;

        for doc in page.documents {
            self.buffered.push_back(doc.into_document()?);
        }
        self.next_page_token = page.next_page_token.filter(|t| !t.is_empty());
        self.started = true;
        Ok(())
    }
}

#[async_trait]
impl DocumentCursor for RestCursor {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn next(&mut self) -> Result<Document, BackendError> {
        loop {
            if let Some(doc) = self.buffered.pop_front() {
                return Ok(doc);
            }
            if self.started && self.next_page_token.is_none() {
                return Err(BackendError::Done);
            }
            self.fetch_page().await?;
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (
            StatusCode::from_name(&body.error.status).unwrap_or_else(|| StatusCode::from_http(status.as_u16())),
            body.error.message,
        ),
        Err(_) => (StatusCode::from_http(status.as_u16()), text),
    };
    Err(BackendError::status(code, message))
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::status(StatusCode::DeadlineExceeded, err.to_string())
    } else if err.is_connect() || err.is_request() {
        BackendError::unavailable(err.to_string())
    } else {
        BackendError::other(err.to_string())
    }
}

fn platform_to_backend(err: PlatformError) -> BackendError {
    if err.is_retryable() {
        BackendError::unavailable(err.to_string())
    } else {
        BackendError::status(StatusCode::Unauthenticated, err.to_string())
    }
}
