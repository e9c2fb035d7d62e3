//! Remote destinations for structured log entries.

use crate::logging_client::{LogEntry, LogEntryPayload, Severity};
use crate::{AccessTokenSource, HttpConfig, PlatformError, build_http_client};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default Cloud Logging API endpoint.
pub const CLOUD_LOGGING_ENDPOINT: &str = "https://logging.googleapis.com";

/// Destination that accepts batches of entries.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Ship `entries` under the short log name `log_name`.
    async fn write_entries(&self, log_name: &str, entries: &[LogEntry]) -> Result<(), PlatformError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteRequest<'a> {
    entries: Vec<WireEntry<'a>>,
    partial_success: bool,
}

#[derive(Serialize)]
struct WireResource {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry<'a> {
    log_name: &'a str,
    resource: WireResource,
    severity: Severity,
    json_payload: &'a LogEntryPayload,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<&'a str>,
    timestamp: DateTime<Utc>,
    insert_id: &'a str,
}

/// Sink writing to the Cloud Logging `entries:write` API.
pub struct CloudLoggingSink {
    http: Client,
    endpoint: String,
    project_id: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl CloudLoggingSink {
    /// Create a sink for `project_id` authenticated by `tokens`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        project_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            http: build_http_client(&HttpConfig::default())?,
            endpoint: CLOUD_LOGGING_ENDPOINT.to_string(),
            project_id: project_id.into(),
            tokens,
        })
    }

    /// Point the sink at another endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Full resource name of a log.
    #[must_use]
    pub fn log_resource_name(&self, log_name: &str) -> String {
        format!("projects/{}/logs/{}", self.project_id, log_name.replace('/', "%2F"))
    }
}

#[async_trait]
impl LogSink for CloudLoggingSink {
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn write_entries(&self, log_name: &str, entries: &[LogEntry]) -> Result<(), PlatformError> {
        let resource_name = self.log_resource_name(log_name);
        let request = WriteRequest {
            entries: entries
                .iter()
                .map(|entry| WireEntry {
                    log_name: &resource_name,
                    resource: WireResource { kind: "global" },
                    severity: entry.severity,
                    json_payload: &entry.payload,
                    labels: &entry.labels,
                    trace: entry.trace.as_deref(),
                    timestamp: entry.timestamp,
                    insert_id: &entry.insert_id,
                })
                .collect(),
            partial_success: true,
        };

        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .post(format!("{}/v2/entries:write", self.endpoint))
            .bearer_auth(token.secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| PlatformError::unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PlatformError::from_status(status, text));
        }

        debug!("Shipped log entries to Cloud Logging");
        Ok(())
    }
}
