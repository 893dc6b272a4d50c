// ARCHITECTURE: Circuit Breaker - Per-Dependency Failure Isolation
//
// One breaker guards exactly one named downstream dependency ("index", "write",
// "search"). Transitions are driven only by call outcomes and elapsed time.
//
// CIRCUIT BREAKER STATES:
// CLOSED (Normal Operation):
//   - Calls pass through
//   - Each failure increments the consecutive-failure counter, each success resets it
//   - Reaching `failure_threshold` transitions to OPEN
//
// OPEN (Circuit Tripped):
//   - Calls are rejected immediately without invoking the wrapped call
//   - After `reset_timeout` the next call is admitted as a probe (HALF-OPEN)
//
// HALF-OPEN (Recovery Probe):
//   - Exactly one probe call in flight, concurrent callers are rejected
//   - Probe success -> CLOSED (counter reset), probe failure -> OPEN (timeout restarts)
//
// SYNCHRONIZATION:
// All state lives behind one mutex that is only held for the admit and record
// steps, never across the wrapped call. A call whose future is dropped before
// it completes (e.g. a queue timeout) is recorded as a failure.

use std::{
    future::Future,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

// CONFIGURATION: CircuitBreakerConfig
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32, // Consecutive failures before opening (default: 5)
    pub reset_timeout: Duration, // Time an open breaker waits before probing (default: 30s)
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

// STATE MACHINE: CircuitBreakerState - Three-State Circuit Breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without touching the dependency.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    /// The wrapped call ran and failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

// METRICS: CircuitBreakerSnapshot - Telemetry view of one breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitBreakerState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    pub times_opened: u64,
    pub time_in_current_state_ms: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
    state_changed_at: Instant,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    rejected_calls: u64,
    times_opened: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            last_failure_at: None,
            probe_in_flight: false,
            state_changed_at: Instant::now(),
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
            times_opened: 0,
        }
    }

    fn set_state(&mut self, state: CircuitBreakerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

// CORE SYSTEM: CircuitBreaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `call` through the breaker. Every error counts as a failure.
    pub async fn execute<F, Fut, T, E>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(call, |_| true).await
    }

    /// Run `call` through the breaker, counting only errors for which
    /// `is_failure` returns true. Errors that do not count are treated as a
    /// healthy answer from the dependency.
    pub async fn execute_with<F, Fut, T, E, P>(
        &self,
        call: F,
        is_failure: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        let admission = self.admit().map_err(|_| BreakerError::Open {
            name: self.name.clone(),
        })?;

        let mut guard = CallGuard {
            breaker: self,
            admission,
            settled: false,
        };

        let result = call().await;

        let counted_failure = match &result {
            Ok(_) => false,
            Err(e) => is_failure(e),
        };
        guard.settled = true;
        if counted_failure {
            self.record_failure(admission);
        } else {
            self.record_success(admission);
        }

        result.map_err(BreakerError::Inner)
    }

    // DECISION: admit or reject a call given the current state
    fn admit(&self) -> Result<Admission, ()> {
        let mut inner = self.lock();
        inner.total_calls += 1;

        match inner.state {
            CircuitBreakerState::Closed => Ok(Admission::Normal),
            CircuitBreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened| opened.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.reset_timeout {
                    inner.set_state(CircuitBreakerState::HalfOpen);
                    inner.probe_in_flight = true;
                    info!(breaker = %self.name, "🔄 Circuit breaker HALF-OPEN, admitting probe call");
                    Ok(Admission::Probe)
                } else {
                    inner.rejected_calls += 1;
                    debug!(breaker = %self.name, "Circuit breaker open, rejecting call");
                    Err(())
                }
            }
            CircuitBreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    inner.rejected_calls += 1;
                    debug!(breaker = %self.name, "Probe already in flight, rejecting call");
                    Err(())
                } else {
                    inner.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.successful_calls += 1;

        match admission {
            Admission::Probe => {
                inner.probe_in_flight = false;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.set_state(CircuitBreakerState::Closed);
                info!(breaker = %self.name, "✅ Circuit breaker CLOSED, dependency recovered");
            }
            Admission::Normal => {
                if inner.state == CircuitBreakerState::Closed {
                    inner.consecutive_failures = 0;
                }
            }
        }
    }

    fn record_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.failed_calls += 1;
        inner.last_failure_at = Some(Utc::now());

        match admission {
            Admission::Probe => {
                inner.probe_in_flight = false;
                inner.consecutive_failures += 1;
                self.trip(&mut inner, CircuitBreakerState::HalfOpen);
            }
            Admission::Normal => {
                if inner.state != CircuitBreakerState::Closed {
                    return;
                }
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.trip(&mut inner, CircuitBreakerState::Closed);
                }
            }
        }
    }

    // TRANSITION: Closed/Half-Open -> Open
    fn trip(&self, inner: &mut BreakerInner, previous: CircuitBreakerState) {
        inner.opened_at = Some(Instant::now());
        inner.times_opened += 1;
        inner.set_state(CircuitBreakerState::Open);
        warn!(
            breaker = %self.name,
            previous_state = ?previous,
            failure_count = inner.consecutive_failures,
            reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
            "⚡ Circuit breaker OPENED, failing fast"
        );
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.consecutive_failures,
            last_failure_at: inner.last_failure_at,
            failure_threshold: self.config.failure_threshold,
            reset_timeout_ms: self.config.reset_timeout.as_millis() as u64,
            total_calls: inner.total_calls,
            successful_calls: inner.successful_calls,
            failed_calls: inner.failed_calls,
            rejected_calls: inner.rejected_calls,
            times_opened: inner.times_opened,
            time_in_current_state_ms: inner.state_changed_at.elapsed().as_millis() as u64,
        }
    }

    /// Force the breaker back to CLOSED. Administrative use only.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = BreakerInner::new();
        info!(breaker = %self.name, "Circuit breaker manually reset to CLOSED");
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// Records an abandoned call as a failure when its future is dropped early.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(breaker = %self.breaker.name, "Call abandoned before completion, counting as failure");
            self.breaker.record_failure(self.admission);
        }
    }
}
