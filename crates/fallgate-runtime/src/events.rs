//! Structured resilience events and the sinks that receive them.
//!
//! Breaker transitions, failures and degradations are reported as a
//! [`ResilienceEvent`] to the injected [`EventSink`]. The default sink
//! forwards to `tracing`.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;

use fallgate_core::{CircuitState, DegradationLevel, TraceId};

/// An event emitted by the resilience layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResilienceEvent {
    CircuitOpened {
        provider: String,
        trace_id: Option<TraceId>,
        previous: CircuitState,
        failure_count: u32,
        failures_in_window: usize,
    },

    CircuitHalfOpened {
        provider: String,
        trace_id: Option<TraceId>,
    },

    CircuitClosed {
        provider: String,
        trace_id: Option<TraceId>,
        success_count: u32,
    },

    CircuitReset {
        provider: String,
        previous: CircuitState,
    },

    CircuitBreakerFailure {
        provider: String,
        trace_id: Option<TraceId>,
        state: CircuitState,
        error: String,
        failure_count: u32,
    },

    CircuitBreakerTimeout {
        provider: String,
        trace_id: Option<TraceId>,
        state: CircuitState,
        #[serde(with = "millis")]
        timeout: Duration,
        failure_count: u32,
    },

    CircuitBreakerRejected {
        provider: String,
        trace_id: Option<TraceId>,
        state: CircuitState,
    },

    FallbackResponseGenerated {
        provider: String,
        trace_id: TraceId,
        sources_count: usize,
        template: String,
        degradation_level: DegradationLevel,
    },

    GenerativeErrorHandled {
        /// Last provider tried before giving up
        provider: Option<String>,
        trace_id: TraceId,
        error: String,
    },

    RetrievalErrorHandled {
        provider: Option<String>,
        trace_id: TraceId,
        error: String,
    },
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

impl ResilienceEvent {
    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            ResilienceEvent::CircuitOpened { .. } => "circuit_opened",
            ResilienceEvent::CircuitHalfOpened { .. } => "circuit_half_opened",
            ResilienceEvent::CircuitClosed { .. } => "circuit_closed",
            ResilienceEvent::CircuitReset { .. } => "circuit_reset",
            ResilienceEvent::CircuitBreakerFailure { .. } => "circuit_breaker_failure",
            ResilienceEvent::CircuitBreakerTimeout { .. } => "circuit_breaker_timeout",
            ResilienceEvent::CircuitBreakerRejected { .. } => "circuit_breaker_rejected",
            ResilienceEvent::FallbackResponseGenerated { .. } => "fallback_response_generated",
            ResilienceEvent::GenerativeErrorHandled { .. } => "generative_error_handled",
            ResilienceEvent::RetrievalErrorHandled { .. } => "retrieval_error_handled",
        }
    }

    /// Provider the event concerns, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            ResilienceEvent::CircuitOpened { provider, .. }
            | ResilienceEvent::CircuitHalfOpened { provider, .. }
            | ResilienceEvent::CircuitClosed { provider, .. }
            | ResilienceEvent::CircuitReset { provider, .. }
            | ResilienceEvent::CircuitBreakerFailure { provider, .. }
            | ResilienceEvent::CircuitBreakerTimeout { provider, .. }
            | ResilienceEvent::CircuitBreakerRejected { provider, .. }
            | ResilienceEvent::FallbackResponseGenerated { provider, .. } => Some(provider),
            ResilienceEvent::GenerativeErrorHandled { provider, .. }
            | ResilienceEvent::RetrievalErrorHandled { provider, .. } => provider.as_deref(),
        }
    }

    /// Trace id attached to the event, if any.
    pub fn trace_id(&self) -> Option<&TraceId> {
        match self {
            ResilienceEvent::CircuitOpened { trace_id, .. }
            | ResilienceEvent::CircuitHalfOpened { trace_id, .. }
            | ResilienceEvent::CircuitClosed { trace_id, .. }
            | ResilienceEvent::CircuitBreakerFailure { trace_id, .. }
            | ResilienceEvent::CircuitBreakerTimeout { trace_id, .. }
            | ResilienceEvent::CircuitBreakerRejected { trace_id, .. } => trace_id.as_ref(),
            ResilienceEvent::FallbackResponseGenerated { trace_id, .. }
            | ResilienceEvent::GenerativeErrorHandled { trace_id, .. }
            | ResilienceEvent::RetrievalErrorHandled { trace_id, .. } => Some(trace_id),
            ResilienceEvent::CircuitReset { .. } => None,
        }
    }
}

/// Receiver for resilience events.
///
/// Called outside of any breaker lock. Implementations must not block for
/// long; they run on the request path.
pub trait EventSink: Send + Sync {
    fn record(&self, event: ResilienceEvent);
}

/// Forwards events to `tracing`.
///
/// Openings, failures, timeouts and handled errors log at WARN; everything
/// else at INFO (rejections at DEBUG).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: ResilienceEvent) {
        let name = event.name();
        let provider = event.provider().unwrap_or("-");
        let trace_id = event.trace_id().map(|t| t.as_str()).unwrap_or("-");
        let payload = serde_json::to_string(&event).unwrap_or_default();

        match &event {
            ResilienceEvent::CircuitOpened { .. }
            | ResilienceEvent::CircuitBreakerFailure { .. }
            | ResilienceEvent::CircuitBreakerTimeout { .. }
            | ResilienceEvent::GenerativeErrorHandled { .. }
            | ResilienceEvent::RetrievalErrorHandled { .. } => {
                tracing::warn!(event = name, provider, trace_id, payload = %payload, "{}", name)
            }
            ResilienceEvent::CircuitBreakerRejected { .. } => {
                tracing::debug!(event = name, provider, trace_id, payload = %payload, "{}", name)
            }
            _ => tracing::info!(event = name, provider, trace_id, payload = %payload, "{}", name),
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _event: ResilienceEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<ResilienceEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all recorded events.
    pub fn events(&self) -> Vec<ResilienceEvent> {
        self.events.lock().clone()
    }

    /// Names of all recorded events.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.name()).collect()
    }

    /// Number of recorded events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: ResilienceEvent) {
        self.events.lock().push(event);
    }
}
