//! Structured logging client for Cloud Logging.
//!
//! Entries carry a severity, the invoking function name, the function
//! execution ID and trace taken from the incoming request headers, and a list
//! of arbitrary JSON data objects. They are buffered and shipped to a
//! [`LogSink`] in batches; when no sink is configured, or the sink breaker is
//! open, entries are written locally through `tracing`.

use crate::credentials::{DEFAULT_METADATA_HOST, detect_project_id};
use crate::sink_breaker::{SinkBreaker, SinkBreakerConfig};
use crate::{CloudLoggingSink, LogSink, MetadataTokenSource, PlatformError};
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Header carrying the Cloud Trace context.
pub const TRACE_CONTEXT_HEADER: &str = "X-Cloud-Trace-Context";

/// Log severity, matching the Cloud Logging `LogSeverity` scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(i32)]
pub enum Severity {
    /// No assigned severity
    Default = 0,
    /// Debug or trace information
    Debug = 100,
    /// Routine information
    Info = 200,
    /// Normal but significant events
    Notice = 300,
    /// Events that might cause problems; the flow continues
    Warning = 400,
    /// Events likely to cause problems; the flow stops
    Error = 500,
    /// Severe events needing a fix within a day
    Critical = 600,
    /// A person must take action immediately
    Alert = 700,
    /// One or more systems are unusable
    Emergency = 800,
}

impl Severity {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Alert => "ALERT",
            Self::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of the `data_object` list.
#[derive(Debug, Clone, PartialEq)]
pub enum LogData {
    /// Arbitrary JSON value
    Value(serde_json::Value),
    /// An error, recorded by its display string
    Error(String),
}

impl LogData {
    /// Record an error by its display string.
    #[must_use]
    pub fn error(err: &(dyn std::error::Error + '_)) -> Self {
        Self::Error(err.to_string())
    }

    /// Serialize any value; a value that fails to serialize is recorded as
    /// the serialization error.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Self::Value(v),
            Err(e) => Self::Error(format!("unserializable log data: {e}")),
        }
    }

    fn into_value(self) -> serde_json::Value {
        match self {
            Self::Value(v) => v,
            Self::Error(s) => serde_json::Value::String(s),
        }
    }
}

impl From<serde_json::Value> for LogData {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for LogData {
    fn from(value: &str) -> Self {
        Self::Value(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for LogData {
    fn from(value: String) -> Self {
        Self::Value(serde_json::Value::String(value))
    }
}

/// JSON payload of a log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntryPayload {
    /// Name of the logging function; distinguishes custom logs from system logs
    #[serde(skip_serializing_if = "String::is_empty")]
    pub invoker: String,
    /// Log message
    pub message: String,
    /// Function execution ID
    #[serde(skip_serializing_if = "String::is_empty")]
    pub execution_id: String,
    /// Additional data objects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_object: Option<Vec<serde_json::Value>>,
}

/// A fully assembled log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity
    pub severity: Severity,
    /// JSON payload
    pub payload: LogEntryPayload,
    /// Common labels merged with the execution ID
    pub labels: BTreeMap<String, String>,
    /// Cloud Trace resource name
    pub trace: Option<String>,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Deduplication ID
    pub insert_id: String,
}

/// Hook called for entries at or above a severity threshold.
pub trait Notifier: Send + Sync {
    /// Receive a notification. Panics are contained by the logger.
    fn notify(&self, severity: Severity, execution_id: &str, message: &str, payload: &LogEntryPayload);
}

/// Logger options.
#[derive(Clone)]
pub struct LoggerOptions {
    /// GCP project; detected when absent
    pub project_id: Option<String>,
    /// Short log name
    pub log_name: String,
    /// Invoker name put in every payload
    pub invoker: String,
    /// Labels attached to every entry
    pub common_labels: BTreeMap<String, String>,
    /// Headers searched, in order, for the execution ID
    pub execution_id_headers: Vec<String>,
    /// Minimum severity forwarded to the notifier
    pub notify_min_severity: Severity,
    /// Optional notifier hook
    pub notifier: Option<Arc<dyn Notifier>>,
    /// Never ship to Cloud Logging
    pub stdout_only: bool,
    /// Entries buffered before an automatic flush
    pub batch_size: usize,
    /// Sink breaker configuration
    pub breaker: SinkBreakerConfig,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            project_id: None,
            log_name: "application".to_string(),
            invoker: String::new(),
            common_labels: BTreeMap::new(),
            execution_id_headers: vec![
                "Function-Execution-Id".to_string(),
                "X-Cloud-Function-Execution-Id".to_string(),
            ],
            notify_min_severity: Severity::Error,
            notifier: None,
            stdout_only: false,
            batch_size: 20,
            breaker: SinkBreakerConfig::default(),
        }
    }
}

impl fmt::Debug for LoggerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerOptions")
            .field("project_id", &self.project_id)
            .field("log_name", &self.log_name)
            .field("invoker", &self.invoker)
            .field("common_labels", &self.common_labels)
            .field("execution_id_headers", &self.execution_id_headers)
            .field("notify_min_severity", &self.notify_min_severity)
            .field("notifier", &self.notifier.is_some())
            .field("stdout_only", &self.stdout_only)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl LoggerOptions {
    /// Set the project ID.
    #[must_use]
    pub fn with_project_id(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    /// Set the log name.
    #[must_use]
    pub fn with_log_name(mut self, name: impl Into<String>) -> Self {
        self.log_name = name.into();
        self
    }

    /// Set the invoker.
    #[must_use]
    pub fn with_invoker(mut self, invoker: impl Into<String>) -> Self {
        self.invoker = invoker.into();
        self
    }

    /// Set the common labels.
    #[must_use]
    pub fn with_common_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.common_labels = labels;
        self
    }

    /// Replace the execution ID header keys.
    #[must_use]
    pub fn with_execution_id_headers<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.execution_id_headers = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Install a notifier for entries at or above `min`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, min: Severity) -> Self {
        self.notifier = Some(notifier);
        self.notify_min_severity = min;
        self
    }

    /// Write every entry locally.
    #[must_use]
    pub const fn with_stdout_only(mut self) -> Self {
        self.stdout_only = true;
        self
    }

    /// Set the batch size (at least one).
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the sink breaker configuration.
    #[must_use]
    pub const fn with_breaker(mut self, breaker: SinkBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }
}

/// Logging client with batching, sink breaker and local fallback.
pub struct CloudLogger {
    options: LoggerOptions,
    sink: Option<Arc<dyn LogSink>>,
    buffer: Mutex<Vec<LogEntry>>,
    breaker: SinkBreaker,
}

impl CloudLogger {
    /// Create a logger shipping to Cloud Logging.
    ///
    /// Without a project ID in the options, the environment or the metadata
    /// server, the logger silently becomes stdout-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the Cloud Logging sink cannot be constructed.
    pub async fn new(mut options: LoggerOptions) -> Result<Self, PlatformError> {
        if options.stdout_only {
            return Ok(Self::assemble(options, None));
        }

        let project_id = match options.project_id.clone() {
            Some(id) => id,
            None => match detect_project_id(&format!("http://{DEFAULT_METADATA_HOST}")).await {
                Ok(id) => id,
                Err(e) => {
                    debug!(error = %e, "No project ID, logging to stdout");
                    options.stdout_only = true;
                    return Ok(Self::assemble(options, None));
                }
            },
        };
        options.project_id = Some(project_id.clone());

        let tokens = Arc::new(MetadataTokenSource::from_env()?);
        let sink = CloudLoggingSink::new(project_id, tokens)?;
        Ok(Self::assemble(options, Some(Arc::new(sink))))
    }

    /// Create a logger shipping to the given sink.
    #[must_use]
    pub fn with_sink(options: LoggerOptions, sink: Arc<dyn LogSink>) -> Self {
        if options.stdout_only {
            return Self::assemble(options, None);
        }
        Self::assemble(options, Some(sink))
    }

    /// Create a logger that writes every entry locally.
    #[must_use]
    pub fn stdout(options: LoggerOptions) -> Self {
        Self::assemble(options.with_stdout_only(), None)
    }

    fn assemble(options: LoggerOptions, sink: Option<Arc<dyn LogSink>>) -> Self {
        Self {
            breaker: SinkBreaker::new(options.breaker.clone()),
            buffer: Mutex::new(Vec::with_capacity(options.batch_size)),
            sink,
            options,
        }
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> &LoggerOptions {
        &self.options
    }

    /// Bind request headers so they need not be passed on every call.
    #[must_use]
    pub const fn for_request<'a>(&'a self, headers: Option<&'a HeaderMap>) -> RequestLogger<'a> {
        RequestLogger {
            base: self,
            headers,
        }
    }

    /// Assemble an entry without emitting it.
    #[must_use]
    pub fn entry(
        &self,
        severity: Severity,
        headers: Option<&HeaderMap>,
        message: impl Into<String>,
        data: Vec<LogData>,
    ) -> LogEntry {
        let execution_id = extract_execution_id(headers, &self.options.execution_id_headers);
        let trace = self
            .options
            .project_id
            .as_deref()
            .and_then(|project| extract_trace(project, headers));
        let labels = merge_labels(
            &self.options.common_labels,
            [("execution_id", execution_id.as_str())],
        );

        LogEntry {
            severity,
            payload: LogEntryPayload {
                invoker: self.options.invoker.clone(),
                message: message.into(),
                execution_id,
                data_object: normalize_data(data),
            },
            labels,
            trace,
            timestamp: Utc::now(),
            insert_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Emit an entry with the given severity.
    ///
    /// With a sink, entries are buffered until `batch_size` accumulate. Await
    /// [`close`](Self::close) before the function returns; a logger dropped
    /// with a non-empty buffer only writes the remaining entries locally.
    pub async fn log(
        &self,
        severity: Severity,
        headers: Option<&HeaderMap>,
        message: impl Into<String>,
        data: Vec<LogData>,
    ) {
        let entry = self.entry(severity, headers, message, data);

        if let Some(notifier) = &self.options.notifier {
            if severity >= self.options.notify_min_severity {
                safe_notify(notifier.as_ref(), &entry);
            }
        }

        if self.sink.is_none() {
            write_locally(&entry);
            return;
        }

        let full = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(entry);
            buffer.len() >= self.options.batch_size
        };
        if full {
            self.flush().await;
        }
    }

    /// Log at DEBUG severity.
    pub async fn debug(&self, headers: Option<&HeaderMap>, message: impl Into<String>, data: Vec<LogData>) {
        self.log(Severity::Debug, headers, message, data).await;
    }

    /// Log at INFO severity.
    pub async fn info(&self, headers: Option<&HeaderMap>, message: impl Into<String>, data: Vec<LogData>) {
        self.log(Severity::Info, headers, message, data).await;
    }

    /// Log at NOTICE severity; meant for the support team.
    pub async fn notice(&self, headers: Option<&HeaderMap>, message: impl Into<String>, data: Vec<LogData>) {
        self.log(Severity::Notice, headers, message, data).await;
    }

    /// Log at WARNING severity.
    pub async fn warning(&self, headers: Option<&HeaderMap>, message: impl Into<String>, data: Vec<LogData>) {
        self.log(Severity::Warning, headers, message, data).await;
    }

    /// Log at ERROR severity.
    pub async fn error(&self, headers: Option<&HeaderMap>, message: impl Into<String>, data: Vec<LogData>) {
        self.log(Severity::Error, headers, message, data).await;
    }

    /// Log at CRITICAL severity.
    pub async fn critical(&self, headers: Option<&HeaderMap>, message: impl Into<String>, data: Vec<LogData>) {
        self.log(Severity::Critical, headers, message, data).await;
    }

    /// Log at EMERGENCY severity.
    pub async fn emergency(&self, headers: Option<&HeaderMap>, message: impl Into<String>, data: Vec<LogData>) {
        self.log(Severity::Emergency, headers, message, data).await;
    }

    /// Ship buffered entries, falling back to local output on failure.
    pub async fn flush(&self) {
        let entries: Vec<LogEntry> = std::mem::take(&mut *self.buffer.lock().await);
        if entries.is_empty() {
            return;
        }

        let Some(sink) = &self.sink else {
            entries.iter().for_each(write_locally);
            return;
        };

        if !self.breaker.allow_shipment().await {
            warn!(count = entries.len(), "Log sink breaker open, writing entries locally");
            entries.iter().for_each(write_locally);
            return;
        }

        match sink.write_entries(&self.options.log_name, &entries).await {
            Ok(()) => self.breaker.record_success().await,
            Err(e) => {
                self.breaker.record_failure().await;
                warn!(error = %e, count = entries.len(), "Log shipment failed, writing entries locally");
                entries.iter().for_each(write_locally);
            }
        }
    }

    /// Flush remaining entries. Call before the function returns.
    pub async fn close(&self) {
        self.flush().await;
    }

    /// Number of entries waiting to be shipped.
    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

impl Drop for CloudLogger {
    fn drop(&mut self) {
        let entries = std::mem::take(self.buffer.get_mut());
        if !entries.is_empty() {
            warn!(count = entries.len(), "Logger dropped before close, writing unshipped entries locally");
            entries.iter().for_each(write_locally);
        }
    }
}

/// Logger bound to one request's headers.
#[derive(Clone, Copy)]
pub struct RequestLogger<'a> {
    base: &'a CloudLogger,
    headers: Option<&'a HeaderMap>,
}

impl RequestLogger<'_> {
    /// Log at DEBUG severity.
    pub async fn debug(&self, message: impl Into<String>, data: Vec<LogData>) {
        self.base.log(Severity::Debug, self.headers, message, data).await;
    }

    /// Log at INFO severity.
    pub async fn info(&self, message: impl Into<String>, data: Vec<LogData>) {
        self.base.log(Severity::Info, self.headers, message, data).await;
    }

    /// Log at NOTICE severity.
    pub async fn notice(&self, message: impl Into<String>, data: Vec<LogData>) {
        self.base.log(Severity::Notice, self.headers, message, data).await;
    }

    /// Log at WARNING severity.
    pub async fn warning(&self, message: impl Into<String>, data: Vec<LogData>) {
        self.base.log(Severity::Warning, self.headers, message, data).await;
    }

    /// Log at ERROR severity.
    pub async fn error(&self, message: impl Into<String>, data: Vec<LogData>) {
        self.base.log(Severity::Error, self.headers, message, data).await;
    }

    /// Log at CRITICAL severity.
    pub async fn critical(&self, message: impl Into<String>, data: Vec<LogData>) {
        self.base.log(Severity::Critical, self.headers, message, data).await;
    }

    /// Log at EMERGENCY severity.
    pub async fn emergency(&self, message: impl Into<String>, data: Vec<LogData>) {
        self.base.log(Severity::Emergency, self.headers, message, data).await;
    }
}

fn normalize_data(data: Vec<LogData>) -> Option<Vec<serde_json::Value>> {
    if data.is_empty() {
        return None;
    }
    Some(data.into_iter().map(LogData::into_value).collect())
}

/// First non-empty value among `keys`.
#[must_use]
pub fn extract_execution_id(headers: Option<&HeaderMap>, keys: &[String]) -> String {
    let Some(headers) = headers else {
        return String::new();
    };
    keys.iter()
        .filter_map(|key| headers.get(key.as_str()))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Trace resource name from `X-Cloud-Trace-Context: TRACE_ID/SPAN_ID;o=1`.
#[must_use]
pub fn extract_trace(project_id: &str, headers: Option<&HeaderMap>) -> Option<String> {
    if project_id.is_empty() {
        return None;
    }
    let header = headers?.get(TRACE_CONTEXT_HEADER)?.to_str().ok()?;
    let trace_id = header.split('/').next().filter(|id| !id.is_empty())?;
    Some(format!("projects/{project_id}/traces/{trace_id}"))
}

fn merge_labels<'a>(
    common: &BTreeMap<String, String>,
    extra: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> BTreeMap<String, String> {
    let mut out = common.clone();
    for (key, value) in extra {
        if !value.is_empty() {
            out.insert(key.to_string(), value.to_string());
        }
    }
    out
}

fn safe_notify(notifier: &dyn Notifier, entry: &LogEntry) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        notifier.notify(
            entry.severity,
            &entry.payload.execution_id,
            &entry.payload.message,
            &entry.payload,
        );
    }));
    if outcome.is_err() {
        warn!(severity = %entry.severity, "Log notifier panicked");
    }
}

/// Write an entry through local tracing.
fn write_locally(entry: &LogEntry) {
    let trace = entry.trace.as_deref().unwrap_or("-");
    let execution_id = entry.payload.execution_id.as_str();
    let invoker = entry.payload.invoker.as_str();
    let data = entry
        .payload
        .data_object
        .as_ref()
        .map(|d| serde_json::Value::Array(d.clone()).to_string())
        .unwrap_or_default();

    match entry.severity {
        Severity::Default | Severity::Debug => debug!(
            severity = %entry.severity,
            invoker,
            execution_id,
            trace,
            data = %data,
            "{}",
            entry.payload.message
        ),
        Severity::Info | Severity::Notice => info!(
            severity = %entry.severity,
            invoker,
            execution_id,
            trace,
            data = %data,
            "{}",
            entry.payload.message
        ),
        Severity::Warning => warn!(
            severity = %entry.severity,
            invoker,
            execution_id,
            trace,
            data = %data,
            "{}",
            entry.payload.message
        ),
        Severity::Error | Severity::Critical | Severity::Alert | Severity::Emergency => error!(
            severity = %entry.severity,
            invoker,
            execution_id,
            trace,
            data = %data,
            "{}",
            entry.payload.message
        ),
    }
}
