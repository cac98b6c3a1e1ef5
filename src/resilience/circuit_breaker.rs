//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first admission check after the open timeout
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! # Design Decisions
//! - One breaker for the single backend, shared by every request
//! - Fail fast in Open state; rejected requests are not counted as failures
//! - Critical sections are O(1) and never touch I/O

use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric value exported on the state gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        })
    }
}

#[derive(Debug)]
struct BreakerRecord {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
}

/// Three-state failure detector guarding the backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    record: RwLock<BreakerRecord>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold,
            timeout,
            record: RwLock::new(BreakerRecord {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
            }),
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.threshold, config.timeout())
    }

    /// Admission check. Moves Open to Half-Open once the timeout has elapsed.
    pub fn allow(&self) -> bool {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        match record.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = record
                    .last_failure
                    .map_or(Duration::MAX, |at| at.elapsed());
                if elapsed > self.timeout {
                    record.state = CircuitState::HalfOpen;
                    drop(record);
                    tracing::info!("Circuit breaker transitioning to half-open state");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        let previous = record.state;
        // A late success from a request admitted before the trip leaves Open alone.
        if previous == CircuitState::Open {
            return;
        }
        record.failures = 0;
        if previous == CircuitState::HalfOpen {
            record.state = CircuitState::Closed;
            drop(record);
            tracing::info!("Circuit breaker closed after successful request");
        }
    }

    pub fn record_failure(&self) {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        record.last_failure = Some(Instant::now());
        match record.state {
            CircuitState::Closed => {
                record.failures = record.failures.saturating_add(1);
                if record.failures >= self.threshold {
                    record.state = CircuitState::Open;
                    let failures = record.failures;
                    drop(record);
                    tracing::warn!(failures, threshold = self.threshold, "Circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                record.state = CircuitState::Open;
                drop(record);
                tracing::warn!("Circuit breaker re-opened after failed trial request");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.record.read().unwrap_or_else(PoisonError::into_inner).state
    }

    /// Current consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.record.read().unwrap_or_else(PoisonError::into_inner).failures
    }

    /// Force the breaker back to Closed.
    pub fn reset(&self) {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        record.state = CircuitState::Closed;
        record.failures = 0;
        drop(record);
        tracing::info!("Circuit breaker reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn opens_exactly_at_threshold() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        for expected in 1..3 {
            cb.record_failure();
            assert_eq!(cb.state(), CircuitState::Closed);
            assert_eq!(cb.failures(), expected);
            assert!(cb.allow());
        }
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn success_resets_counter_while_closed() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failures(), 0);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_trial_then_close() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(20));
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.allow());

        thread::sleep(Duration::from_millis(40));
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failures(), 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(20));
        cb.record_failure();
        thread::sleep(Duration::from_millis(40));
        assert!(cb.allow());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow(), "timestamp must be refreshed by the failed trial");
    }

    #[test]
    fn failure_while_open_only_refreshes_timestamp() {
        let cb = CircuitBreaker::new(2, Duration::from_millis(50));
        cb.record_failure();
        cb.record_failure();
        thread::sleep(Duration::from_millis(30));
        cb.record_failure();
        assert_eq!(cb.failures(), 2);

        thread::sleep(Duration::from_millis(30));
        assert!(!cb.allow(), "open window restarts from the latest failure");
    }

    #[test]
    fn late_success_while_open_keeps_count() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failures(), 2);
    }

    #[test]
    fn reset_forces_closed() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failures(), 0);
        assert!(cb.allow());
    }

    #[test]
    fn concrete_recovery_scenario() {
        let cb = CircuitBreaker::new(3, Duration::from_millis(100));
        for _ in 0..3 {
            cb.record_failure();
        }
        thread::sleep(Duration::from_millis(50));
        assert!(!cb.allow());

        thread::sleep(Duration::from_millis(100));
        assert!(cb.allow());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failures(), 0);
    }

    #[test]
    fn concurrent_failures_open_once() {
        let cb = Arc::new(CircuitBreaker::new(50, Duration::from_secs(60)));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cb = cb.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        cb.record_failure();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failures(), 50);
    }

    #[test]
    fn state_names() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
        assert_eq!(CircuitState::Open.as_gauge(), 1.0);
    }
}
