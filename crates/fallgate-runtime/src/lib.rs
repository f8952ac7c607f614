//! # fallgate-runtime
//!
//! Async resilience layer for a multi-provider generative gateway.
//!
//! This crate wraps calls to generative providers in per-provider circuit
//! breakers, falls back across providers in a fixed priority order, and
//! degrades to retrieval-only answers (built by `fallgate-core`) when no
//! provider can be reached.
//!
//! ## Components
//!
//! - [`CircuitBreaker`] / [`CircuitBreakerRegistry`]: failure isolation and
//!   ordered fallback
//! - [`DegradationController`]: health classification and templated answers
//! - [`ErrorBoundary`]: one place to turn upstream failures into responses
//! - [`ResilientGateway`]: all of the above for a single request
//! - [`EventSink`]: where breaker and degradation events go
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fallgate_runtime::{ResilientGateway, TraceId};
//!
//! let gateway = ResilientGateway::builder()
//!     .provider(Arc::new(openai_client))
//!     .provider(Arc::new(anthropic_client))
//!     .config(GatewayConfig::from_file("fallgate.yaml")?)
//!     .build()?;
//!
//! let answer = gateway.answer(query, &sources, &TraceId::generate()).await;
//! ```

pub mod boundary;
pub mod degradation;
pub mod events;
pub mod orchestrator;
pub mod providers;
pub mod resilience;

pub use boundary::ErrorBoundary;
pub use degradation::{
    AnswerComposer, DegradationController, FallbackDecision, HealthReport, ProviderHealth,
};
pub use events::{EventSink, MemoryEventSink, NoopEventSink, ResilienceEvent, TracingEventSink};
pub use orchestrator::{GatewayAnswer, GatewayError, ResilientGateway, ResilientGatewayBuilder};
pub use providers::{CompletionRequest, CompletionResponse, GenerativeProvider, ProviderError};
pub use resilience::{
    BreakerStatus, CircuitBreaker, CircuitBreakerRegistry, CircuitBreakerStats, CircuitError,
    FallbackError,
};

// Core types callers need alongside the runtime
pub use fallgate_core::{
    CircuitBreakerConfig, CircuitState, DegradationLevel, FallbackResponse, GatewayConfig,
    SourceRecord, TraceId,
};
