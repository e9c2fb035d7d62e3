//! Counter metrics in Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: String,
    help: String,
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            value: AtomicU64::new(0),
        }
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `amount`.
    pub fn inc_by(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format as Prometheus text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Counters for a retry loop.
#[derive(Debug)]
pub struct RetryMetrics {
    /// Backend invocations
    pub attempts: Counter,
    /// Session refreshes
    pub refreshes: Counter,
    /// Calls that ran out of attempts
    pub exhausted: Counter,
    /// Calls stopped by a non-transient error
    pub fatal: Counter,
}

impl RetryMetrics {
    /// Create counters named `{prefix}_attempts_total` and so on.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            attempts: Counter::new(format!("{prefix}_attempts_total"), "Backend invocations"),
            refreshes: Counter::new(format!("{prefix}_refreshes_total"), "Session refreshes"),
            exhausted: Counter::new(format!("{prefix}_exhausted_total"), "Calls out of attempts"),
            fatal: Counter::new(format!("{prefix}_fatal_total"), "Calls stopped by fatal errors"),
        }
    }

    /// Format all counters as Prometheus text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        [&self.attempts, &self.refreshes, &self.exhausted, &self.fatal]
            .iter()
            .map(|c| c.to_prometheus())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter", "A test counter");
        assert_eq!(counter.get(), 0);

        counter.inc();
        counter.inc_by(4);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_counter_prometheus_format() {
        let counter = Counter::new("calls_total", "Calls");
        counter.inc_by(3);

        let output = counter.to_prometheus();
        assert!(output.contains("# HELP calls_total Calls"));
        assert!(output.contains("# TYPE calls_total counter"));
        assert!(output.contains("calls_total 3"));
    }

    #[test]
    fn test_retry_metrics_names() {
        let metrics = RetryMetrics::new("firestore");
        metrics.refreshes.inc();

        assert_eq!(metrics.attempts.name(), "firestore_attempts_total");
        let output = metrics.to_prometheus();
        assert!(output.contains("firestore_refreshes_total 1"));
        assert!(output.contains("firestore_fatal_total 0"));
    }
}
