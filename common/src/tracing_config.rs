//! Tracing subscriber setup.
//!
//! Cloud Functions capture stdout; JSON lines are parsed into structured
//! entries there, so JSON output is selected automatically when running on
//! the platform (`K_SERVICE` set) or when `LOG_FORMAT=json`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name attached to startup logs
    pub service_name: String,
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("K_SERVICE").unwrap_or_else(|_| "cloud-function".to_string()),
            log_level: "info".to_string(),
            json_output: json_requested(
                std::env::var("LOG_FORMAT").ok().as_deref(),
                std::env::var("K_SERVICE").is_ok(),
            ),
        }
    }
}

impl TracingConfig {
    /// Set the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the default log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Force plain text output.
    #[must_use]
    pub const fn with_text_output(mut self) -> Self {
        self.json_output = false;
        self
    }
}

/// Whether JSON output is wanted for a `LOG_FORMAT` value and platform flag.
#[must_use]
pub fn json_requested(log_format: Option<&str>, on_platform: bool) -> bool {
    match log_format {
        Some(format) if format.eq_ignore_ascii_case("json") => true,
        Some(format) if format.eq_ignore_ascii_case("text") => false,
        _ => on_platform,
    }
}

/// Initialize the global subscriber. Later calls are ignored.
pub fn init_tracing(config: &TracingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let installed = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    if installed.is_ok() {
        tracing::debug!(service = %config.service_name, json = config.json_output, "Tracing initialized");
    }
}
