//! Circuit breaker abstraction used to guard the database health check and
//! outbound HTTP dispatch from hammering a target that is already down.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitMetrics {
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub state: CircuitState,
}

/// Behavior every circuit breaker in `dispatch-core` implements. Kept as a
/// trait (rather than a single concrete type) so the worker's dispatch
/// breaker and the API's database-health breaker can have different trip
/// thresholds while sharing call sites that only need the behavior.
pub trait CircuitBreakerBehavior: Send + Sync {
    fn name(&self) -> &str;
    fn state(&self) -> CircuitState;
    fn should_allow(&self) -> bool;
    fn record_success(&self);
    fn record_failure(&self);
    fn is_healthy(&self) -> bool {
        matches!(self.state(), CircuitState::Closed | CircuitState::HalfOpen)
    }
    fn force_open(&self);
    fn force_closed(&self);
    fn metrics(&self) -> CircuitMetrics;
}

struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
}

/// A threshold-based breaker: opens after `failure_threshold` consecutive
/// failures, stays open for `reset_after`, then allows one probe request
/// (half-open) before fully closing on success or re-opening on failure.
pub struct ThresholdCircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_after: Duration,
    consecutive_failures: AtomicU32,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    inner: Mutex<Inner>,
}

impl ThresholdCircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_after: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            reset_after,
            consecutive_failures: AtomicU32::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                opened_at: None,
            }),
        }
    }
}

impl CircuitBreakerBehavior for ThresholdCircuitBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CircuitState {
        let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
        if guard.state == CircuitState::Open {
            if let Some(opened_at) = guard.opened_at {
                if opened_at.elapsed() >= self.reset_after {
                    guard.state = CircuitState::HalfOpen;
                }
            }
        }
        guard.state
    }

    fn should_allow(&self) -> bool {
        matches!(self.state(), CircuitState::Closed | CircuitState::HalfOpen)
    }

    fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
        guard.state = CircuitState::Closed;
        guard.opened_at = None;
    }

    fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.failure_threshold {
            let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
            guard.state = CircuitState::Open;
            guard.opened_at = Some(Instant::now());
        }
    }

    fn force_open(&self) {
        let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
        guard.state = CircuitState::Open;
        guard.opened_at = Some(Instant::now());
    }

    fn force_closed(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
        guard.state = CircuitState::Closed;
        guard.opened_at = None;
    }

    fn metrics(&self) -> CircuitMetrics {
        CircuitMetrics {
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            state: self.state(),
        }
    }
}
