//! Shared library for cross-cutting concerns in Rust cloud functions.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration and building
//! - Retry budgets and pluggable backoff strategies
//! - GCP access-token sources (metadata server, static tokens)
//! - Structured Cloud Logging client with local fallback
//! - Legacy line-oriented log helpers
//! - Tracing subscriber setup
//! - Counter metrics
//! - HTTP handler helpers (JSON errors, CORS, query parameters)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod retry;
pub mod credentials;
pub mod sink_breaker;
pub mod log_sink;
pub mod logging_client;
pub mod legacy_log;
pub mod tracing_config;
pub mod metrics;
pub mod handler;

pub use error::PlatformError;
pub use http::{HttpConfig, build_http_client};
pub use retry::{Backoff, ExponentialBackoff, NoBackoff, RetryBudget, RetryConfig, RetryPolicy};
pub use credentials::{
    AccessToken, AccessTokenSource, MetadataTokenSource, StaticTokenSource, detect_project_id,
    project_id_from_env,
};
pub use log_sink::{CloudLoggingSink, LogSink};
pub use logging_client::{
    CloudLogger, LogData, LogEntry, LogEntryPayload, LoggerOptions, Notifier, RequestLogger,
    Severity,
};
pub use legacy_log::{LogType, log_write, log_write_debug};
pub use metrics::{Counter, RetryMetrics};
pub use handler::{JsonError, cors_preflight_headers, url_parameter};
pub use tracing_config::{TracingConfig, init_tracing};
