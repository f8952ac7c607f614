//! Per-provider circuit breaker.
//!
//! When calls to a provider fail repeatedly, the circuit opens and
//! subsequent calls are rejected without touching the provider until the
//! recovery timeout has passed. A few trial calls then decide whether the
//! circuit closes again.
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     current_failure_count >= failure_threshold
//!                      OR failures in window > max_failures_per_window
//! Open     → HalfOpen: recovery_timeout elapsed since the last failure
//! HalfOpen → Closed:   success_threshold trial successes
//! HalfOpen → Open:     any trial failure
//! ```
//!
//! # Locking
//! All bookkeeping happens under one `parking_lot::Mutex` per breaker. The
//! lock is never held while the protected operation runs, and events are
//! delivered to the sink after it is released.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use fallgate_core::{CircuitBreakerConfig, CircuitState, ConfigError, TraceId};

use super::error::{BoxError, CircuitError};
use super::window::SlidingWindow;
use crate::events::{EventSink, ResilienceEvent, TracingEventSink};

/// Counters for one breaker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    /// Calls admitted to the operation
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Failed calls, timeouts included
    pub failed_requests: u64,
    pub timeout_requests: u64,
    /// Calls refused without invoking the operation
    pub rejected_requests: u64,
    pub circuit_opened_count: u64,
    pub circuit_closed_count: u64,
    /// Failures since entering the current state
    pub current_failure_count: u32,
    /// Successes since entering the current state
    pub current_success_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub failures_in_window: usize,
    pub successes_in_window: usize,
}

/// Point-in-time view of a breaker, safe to render on a health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    /// Open, but the next call will be admitted as a trial
    pub recovery_due: bool,
    pub stats: CircuitBreakerStats,
    pub config: CircuitBreakerConfig,
}

impl BreakerStatus {
    /// Whether the next call would reach the operation.
    pub fn admits_calls(&self) -> bool {
        self.state != CircuitState::Open || self.recovery_due
    }
}

struct BreakerInner {
    state: CircuitState,
    stats: CircuitBreakerStats,
    last_failure_at: Option<Instant>,
    failures: SlidingWindow,
    successes: SlidingWindow,
}

impl BreakerInner {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            stats: CircuitBreakerStats::default(),
            last_failure_at: None,
            failures: SlidingWindow::new(config.window_size, config.window_capacity),
            successes: SlidingWindow::new(config.window_size, config.window_capacity),
        }
    }

    fn prune(&mut self, now: Instant) {
        self.failures.prune(now);
        self.successes.prune(now);
    }

    fn remaining_recovery(&self, config: &CircuitBreakerConfig, now: Instant) -> Duration {
        match self.last_failure_at {
            Some(at) => config
                .recovery_timeout
                .saturating_sub(now.saturating_duration_since(at)),
            None => Duration::ZERO,
        }
    }
}

enum FailureKind {
    Error(BoxError),
    Timeout,
}

/// Circuit breaker guarding one named provider.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker that logs through `tracing`.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        Self::with_events(name, config, Arc::new(TracingEventSink))
    }

    /// Create a breaker reporting to the given sink.
    pub fn with_events(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(name.into(), config, events))
    }

    /// Construct from a config that has already passed validation.
    pub(crate) fn from_validated(
        name: String,
        config: CircuitBreakerConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let inner = BreakerInner::new(&config);
        Self {
            name,
            config,
            inner: Mutex::new(inner),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state as stored. An Open breaker whose recovery is due still
    /// reports Open until the next call moves it to HalfOpen.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of state, counters and config. No side effects.
    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock();
        let now = Instant::now();

        let mut stats = inner.stats.clone();
        stats.failures_in_window = inner.failures.count_at(now);
        stats.successes_in_window = inner.successes.count_at(now);

        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            recovery_due: inner.state == CircuitState::Open
                && inner.remaining_recovery(&self.config, now).is_zero(),
            stats,
            config: self.config.clone(),
        }
    }

    /// Run `operation` under the breaker.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        self.call_traced(None, operation).await
    }

    /// Run `operation` under the breaker, stamping events with a trace id.
    ///
    /// The operation is not invoked at all when the call is rejected.
    pub async fn call_traced<T, E, F, Fut>(
        &self,
        trace_id: Option<&TraceId>,
        operation: F,
    ) -> Result<T, CircuitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        self.admit(trace_id)?;

        // Dropping the future on timeout abandons the in-flight call
        match tokio::time::timeout(self.config.timeout, operation()).await {
            Ok(Ok(value)) => {
                self.on_success(trace_id);
                Ok(value)
            }
            Ok(Err(e)) => Err(self.on_failure(trace_id, FailureKind::Error(e.into()))),
            Err(_) => Err(self.on_failure(trace_id, FailureKind::Timeout)),
        }
    }

    /// Force the breaker back to Closed with fresh counters.
    pub fn reset(&self) {
        let previous = {
            let mut inner = self.inner.lock();
            let previous = inner.state;
            *inner = BreakerInner::new(&self.config);
            previous
        };

        self.events.record(ResilienceEvent::CircuitReset {
            provider: self.name.clone(),
            previous,
        });
    }

    /// Decide whether a call may proceed.
    fn admit(&self, trace_id: Option<&TraceId>) -> Result<(), CircuitError> {
        let mut events = Vec::new();

        let result = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            inner.prune(now);

            if inner.state == CircuitState::Open
                && inner.remaining_recovery(&self.config, now).is_zero()
            {
                self.transition(&mut inner, CircuitState::HalfOpen, trace_id, &mut events);
            }

            let permitted = match inner.state {
                CircuitState::Closed => true,
                CircuitState::Open => false,
                CircuitState::HalfOpen => self.trial_permitted(&inner),
            };

            if permitted {
                inner.stats.total_requests += 1;
                Ok(())
            } else {
                inner.stats.rejected_requests += 1;
                events.push(ResilienceEvent::CircuitBreakerRejected {
                    provider: self.name.clone(),
                    trace_id: trace_id.cloned(),
                    state: inner.state,
                });
                Err(CircuitError::Open {
                    provider: self.name.clone(),
                    retry_after: inner.remaining_recovery(&self.config, now),
                })
            }
        };

        self.emit(events);
        result
    }

    /// HalfOpen trial budget: the reset-on-entry counters must not have
    /// reached either threshold.
    fn trial_permitted(&self, inner: &BreakerInner) -> bool {
        inner.stats.current_success_count < self.config.success_threshold
            && inner.stats.current_failure_count < self.config.failure_threshold
    }

    fn on_success(&self, trace_id: Option<&TraceId>) {
        let mut events = Vec::new();

        {
            let mut inner = self.inner.lock();
            let now = Instant::now();

            inner.stats.successful_requests += 1;
            inner.stats.last_success_time = Some(Utc::now());
            inner.successes.record(now);
            inner.failures.prune(now);

            match inner.state {
                CircuitState::Closed => {
                    inner.stats.current_success_count =
                        inner.stats.current_success_count.saturating_add(1);
                }
                CircuitState::HalfOpen => {
                    inner.stats.current_success_count =
                        inner.stats.current_success_count.saturating_add(1);
                    if inner.stats.current_success_count >= self.config.success_threshold {
                        self.transition(&mut inner, CircuitState::Closed, trace_id, &mut events);
                    }
                }
                // Admitted before the circuit opened; counted, but does not move state
                CircuitState::Open => {}
            }
        }

        self.emit(events);
    }

    fn on_failure(&self, trace_id: Option<&TraceId>, kind: FailureKind) -> CircuitError {
        let mut events = Vec::new();

        let error = {
            let mut inner = self.inner.lock();
            let now = Instant::now();

            inner.stats.failed_requests += 1;
            if matches!(kind, FailureKind::Timeout) {
                inner.stats.timeout_requests += 1;
            }
            inner.stats.last_failure_time = Some(Utc::now());
            inner.last_failure_at = Some(now);
            inner.failures.record(now);
            inner.successes.prune(now);

            let state = inner.state;
            if state != CircuitState::Open {
                inner.stats.current_failure_count =
                    inner.stats.current_failure_count.saturating_add(1);
            }

            let failure_count = inner.stats.current_failure_count;
            events.push(match &kind {
                FailureKind::Timeout => ResilienceEvent::CircuitBreakerTimeout {
                    provider: self.name.clone(),
                    trace_id: trace_id.cloned(),
                    state,
                    timeout: self.config.timeout,
                    failure_count,
                },
                FailureKind::Error(e) => ResilienceEvent::CircuitBreakerFailure {
                    provider: self.name.clone(),
                    trace_id: trace_id.cloned(),
                    state,
                    error: e.to_string(),
                    failure_count,
                },
            });

            match state {
                CircuitState::HalfOpen => {
                    self.transition(&mut inner, CircuitState::Open, trace_id, &mut events);
                    CircuitError::Open {
                        provider: self.name.clone(),
                        retry_after: self.config.recovery_timeout,
                    }
                }
                CircuitState::Closed => {
                    if self.should_open(&inner) {
                        self.transition(&mut inner, CircuitState::Open, trace_id, &mut events);
                    }
                    self.failure_error(kind)
                }
                CircuitState::Open => self.failure_error(kind),
            }
        };

        self.emit(events);
        error
    }

    fn should_open(&self, inner: &BreakerInner) -> bool {
        inner.stats.current_failure_count >= self.config.failure_threshold
            || inner.failures.len() > self.config.max_failures_per_window as usize
    }

    fn failure_error(&self, kind: FailureKind) -> CircuitError {
        match kind {
            FailureKind::Timeout => CircuitError::Timeout {
                provider: self.name.clone(),
                timeout: self.config.timeout,
            },
            FailureKind::Error(source) => CircuitError::Failure {
                provider: self.name.clone(),
                source,
            },
        }
    }

    /// Move to a new state and reset the counters that belong to it.
    ///
    /// Entering Open keeps the failure count that tripped it; entering
    /// HalfOpen or Closed starts both counters from zero.
    fn transition(
        &self,
        inner: &mut BreakerInner,
        to: CircuitState,
        trace_id: Option<&TraceId>,
        events: &mut Vec<ResilienceEvent>,
    ) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;

        match to {
            CircuitState::Open => {
                inner.stats.circuit_opened_count += 1;
                inner.stats.current_success_count = 0;
                events.push(ResilienceEvent::CircuitOpened {
                    provider: self.name.clone(),
                    trace_id: trace_id.cloned(),
                    previous: from,
                    failure_count: inner.stats.current_failure_count,
                    failures_in_window: inner.failures.len(),
                });
            }
            CircuitState::HalfOpen => {
                inner.stats.current_failure_count = 0;
                inner.stats.current_success_count = 0;
                events.push(ResilienceEvent::CircuitHalfOpened {
                    provider: self.name.clone(),
                    trace_id: trace_id.cloned(),
                });
            }
            CircuitState::Closed => {
                inner.stats.circuit_closed_count += 1;
                let success_count = inner.stats.current_success_count;
                inner.stats.current_failure_count = 0;
                inner.stats.current_success_count = 0;
                events.push(ResilienceEvent::CircuitClosed {
                    provider: self.name.clone(),
                    trace_id: trace_id.cloned(),
                    success_count,
                });
            }
        }
    }

    fn emit(&self, events: Vec<ResilienceEvent>) {
        for event in events {
            self.events.record(event);
        }
    }
}
