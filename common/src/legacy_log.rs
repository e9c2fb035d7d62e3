//! Line-oriented log helpers.
//!
//! Older functions emit one parseable line per event instead of structured
//! entries:
//!
//! ```text
//! application:server, logType:error1, errorCode:510, UserId: u-1, message:write failed
//! ```

use std::fmt;
use tracing::info;

/// Environment variable enabling [`log_write_debug`].
pub const DEBUG_ENV: &str = "DEBUG";

/// Error code for failures of external APIs.
pub const ERROR_CODE_EXTERNAL_API: u16 = 100;
/// Error code for internal failures.
pub const ERROR_CODE_INTERNAL: u16 = 500;
/// Error code for Firebase failures.
pub const ERROR_CODE_FIREBASE: u16 = 510;

/// Log line category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    /// Error with higher priority
    Error1,
    /// Error with lower priority
    Error2,
    /// Informational
    Info,
}

impl LogType {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error1 => "error1",
            Self::Error2 => "error2",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format one log line. An empty `user_id` is omitted.
#[must_use]
pub fn format_log_line(log_type: LogType, error_code: u16, message: &str, user_id: &str) -> String {
    let user_part = if user_id.is_empty() {
        String::new()
    } else {
        format!(", UserId: {user_id}")
    };
    format!("application:server, logType:{log_type}, errorCode:{error_code}{user_part}, message:{message}")
}

/// Write one log line.
pub fn log_write(log_type: LogType, error_code: u16, message: &str, user_id: &str) {
    info!("{}", format_log_line(log_type, error_code, message, user_id));
}

/// Whether a `DEBUG` value turns debug lines on.
#[must_use]
pub fn debug_enabled(raw: Option<&str>) -> bool {
    raw == Some("true")
}

/// Write a debug line, only when `DEBUG=true`.
pub fn log_write_debug(message: &str) {
    if debug_enabled(std::env::var(DEBUG_ENV).ok().as_deref()) {
        log_write(LogType::Info, 0, &format!("[DEBUG] {message}"), "");
    }
}
