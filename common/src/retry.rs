//! Retry budgets and backoff strategies.
//!
//! A [`RetryBudget`] caps how many times an operation is attempted. It can be
//! fixed in code or read from an environment variable each time it is
//! resolved. A [`Backoff`] decides how long to wait between attempts; the
//! default is no wait at all.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Budget used when the configured value is missing or unusable.
pub const FALLBACK_BUDGET: u32 = 1;

/// Maximum number of attempts for one logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryBudget {
    /// A fixed number of attempts.
    Fixed(u32),
    /// Read from the named environment variable at resolve time.
    Env(String),
}

impl RetryBudget {
    /// Budget read from `var` on every [`resolve`](Self::resolve).
    #[must_use]
    pub fn from_env_var(var: impl Into<String>) -> Self {
        Self::Env(var.into())
    }

    /// Resolve the budget to an attempt count of at least one.
    ///
    /// An unset, non-numeric or non-positive environment value falls back to
    /// [`FALLBACK_BUDGET`] and records an informational log line.
    #[must_use]
    pub fn resolve(&self) -> u32 {
        match self {
            Self::Fixed(n) => (*n).max(1),
            Self::Env(var) => {
                let raw = std::env::var(var).ok();
                parse_budget(raw.as_deref()).unwrap_or_else(|| {
                    info!(
                        variable = %var,
                        budget = FALLBACK_BUDGET,
                        "{var} is missing, was set to: {FALLBACK_BUDGET}"
                    );
                    FALLBACK_BUDGET
                })
            }
        }
    }
}

/// Parse a raw budget value, rejecting anything that is not a positive integer.
#[must_use]
pub fn parse_budget(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok()).filter(|n| *n > 0)
}

/// Strategy deciding the pause before the next attempt.
pub trait Backoff: Send + Sync + Debug {
    /// Delay to wait after the failed attempt number `attempt` (0-based).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Retry immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl Backoff for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Exponential backoff with optional jitter.
#[derive(Debug, Clone, Default)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    /// Create a backoff from the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl Backoff for ExponentialBackoff {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    fn delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64
            * self.config.multiplier.powi(attempt as i32);

        let delay_ms = base_delay.min(self.config.max_delay.as_millis() as f64);

        let final_delay = if self.config.jitter {
            // up to 25% jitter
            let jitter_factor = 1.0 + (rand::random::<f64>() * 0.25);
            delay_ms * jitter_factor
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Bounded retry loop for operations that need no connection handling.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    budget: RetryBudget,
    backoff: Arc<dyn Backoff>,
}

impl RetryPolicy {
    /// Create a policy with the given budget and no backoff.
    #[must_use]
    pub fn new(budget: RetryBudget) -> Self {
        Self {
            budget,
            backoff: Arc::new(NoBackoff),
        }
    }

    /// Replace the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// The configured budget.
    #[must_use]
    pub const fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    /// Execute an async operation, retrying while `should_retry` allows it.
    ///
    /// # Errors
    ///
    /// Returns the last error once the budget is spent or `should_retry`
    /// declines.
    pub async fn execute<F, Fut, T, E, R>(&self, mut operation: F, should_retry: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let bound = self.budget.resolve();
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    attempt += 1;
                    if attempt >= bound || !should_retry(&error) {
                        return Err(error);
                    }
                    let delay = self.backoff.delay(attempt - 1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_parse_budget() {
        assert_eq!(parse_budget(Some("3")), Some(3));
        assert_eq!(parse_budget(Some(" 7 ")), Some(7));
        assert_eq!(parse_budget(Some("0")), None);
        assert_eq!(parse_budget(Some("-2")), None);
        assert_eq!(parse_budget(Some("three")), None);
        assert_eq!(parse_budget(None), None);
    }

    #[test]
    fn test_fixed_budget_never_below_one() {
        assert_eq!(RetryBudget::Fixed(0).resolve(), 1);
        assert_eq!(RetryBudget::Fixed(4).resolve(), 4);
    }

    #[test]
    fn test_unset_env_budget_falls_back() {
        let budget = RetryBudget::from_env_var("CLOUDFN_COMMON_TEST_UNSET_BUDGET");
        assert_eq!(budget.resolve(), FALLBACK_BUDGET);
    }

    #[test]
    fn test_delay_calculation_no_jitter() {
        let backoff = ExponentialBackoff::new(RetryConfig::default().without_jitter());

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_max_delay_cap() {
        let backoff = ExponentialBackoff::new(
            RetryConfig::default()
                .without_jitter()
                .with_max_delay(Duration::from_millis(150)),
        );
        assert_eq!(backoff.delay(2), Duration::from_millis(150));
    }

    #[test]
    fn test_no_backoff_is_zero() {
        assert_eq!(NoBackoff.delay(5), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_execute_success() {
        let policy = RetryPolicy::new(RetryBudget::Fixed(3));
        let result: Result<i32, String> = policy.execute(|| async { Ok(42) }, |_| true).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_execute_stops_at_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(RetryBudget::Fixed(2));
        let result: Result<(), String> = policy
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("boom".to_string()) }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_execute_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(RetryBudget::Fixed(5));
        let result: Result<(), String> = policy
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal".to_string()) }
                },
                |_| false,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
