//! Breaker guarding the remote log sink.
//!
//! After a run of consecutive shipment failures the breaker opens and the
//! logger writes entries locally instead of calling the sink. Once the
//! cool-down has elapsed a single probe shipment is let through; its outcome
//! closes or re-opens the breaker.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Shipments go to the sink
    Closed,
    /// Shipments are diverted to the local fallback
    Open,
    /// One probe shipment is in flight
    Probing,
}

/// Breaker configuration.
#[derive(Debug, Clone)]
pub struct SinkBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Time spent open before a probe is allowed
    pub cool_down: Duration,
}

impl Default for SinkBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cool_down: Duration::from_secs(30),
        }
    }
}

impl SinkBreakerConfig {
    /// Set the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the cool-down.
    #[must_use]
    pub const fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure breaker for log shipments.
#[derive(Debug)]
pub struct SinkBreaker {
    config: SinkBreakerConfig,
    inner: Mutex<Inner>,
}

impl SinkBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub fn new(config: SinkBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether the next shipment may go to the sink.
    pub async fn allow_shipment(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Probing => false,
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cool_down);
                if cooled {
                    inner.state = BreakerState::Probing;
                }
                cooled
            }
        }
    }

    /// Record a successful shipment.
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Record a failed shipment.
    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures += 1;
        let trip = inner.state == BreakerState::Probing
            || inner.consecutive_failures >= self.config.failure_threshold;
        if trip {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Current state.
    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }
}

impl Default for SinkBreaker {
    fn default() -> Self {
        Self::new(SinkBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let breaker = SinkBreaker::new(SinkBreakerConfig::default().with_failure_threshold(2));

        breaker.record_failure().await;
        assert_eq!(breaker.state().await, BreakerState::Closed);
        assert!(breaker.allow_shipment().await);

        breaker.record_failure().await;
        assert_eq!(breaker.state().await, BreakerState::Open);
        assert!(!breaker.allow_shipment().await);
    }

    #[tokio::test]
    async fn test_success_resets_failure_run() {
        let breaker = SinkBreaker::new(SinkBreakerConfig::default().with_failure_threshold(2));

        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_probe_after_cool_down() {
        let breaker = SinkBreaker::new(
            SinkBreakerConfig::default()
                .with_failure_threshold(1)
                .with_cool_down(Duration::from_millis(5)),
        );

        breaker.record_failure().await;
        assert!(!breaker.allow_shipment().await);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.allow_shipment().await);
        assert_eq!(breaker.state().await, BreakerState::Probing);
        assert!(!breaker.allow_shipment().await);

        breaker.record_failure().await;
        assert_eq!(breaker.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn test_probe_success_closes() {
        let breaker = SinkBreaker::new(
            SinkBreakerConfig::default()
                .with_failure_threshold(1)
                .with_cool_down(Duration::ZERO),
        );

        breaker.record_failure().await;
        assert!(breaker.allow_shipment().await);
        breaker.record_success().await;
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }
}
