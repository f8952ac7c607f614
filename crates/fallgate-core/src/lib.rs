//! # fallgate-core
//!
//! Deterministic building blocks for the Fallgate resilience layer.
//!
//! This crate holds everything that does not need an async runtime:
//! - Shared types (`CircuitState`, `DegradationLevel`, `FallbackResponse`, ...)
//! - Breaker and gateway configuration, validated against a JSON Schema
//! - Retrieval-only answer composition (query classification, snippet
//!   summarization, templates)
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the same query, sources and trace id always produce
//!    the same fallback answer
//! 2. **No remote calls**: fallback answers are built only from text the
//!    caller already has
//!
//! ## Example
//!
//! ```rust
//! use fallgate_core::{FallbackComposer, SourceRecord, TraceId};
//!
//! let sources = vec![SourceRecord::new(
//!     "Circuit breakers",
//!     "https://martinfowler.com/bliki/CircuitBreaker.html",
//!     "martinfowler.com",
//!     "A circuit breaker wraps a protected call and trips after repeated failures.",
//! )];
//!
//! let response = FallbackComposer::default()
//!     .compose("what is a circuit breaker?", &sources, &TraceId::new("req-1"), None)
//!     .unwrap();
//!
//! assert!(response.answer.ends_with("Trace ID: req-1"));
//! ```

pub mod config;
pub mod fallback;
pub mod types;

// Re-export main types at crate root
pub use config::{CircuitBreakerConfig, CircuitBreakerOverrides, ConfigError, GatewayConfig};
pub use fallback::{classify_query, FallbackComposer, QueryKind, TemplateError, TemplateSet};
pub use types::{
    CircuitState, DegradationLevel, FallbackResponse, SourceRecord, TraceId,
    EMERGENCY_CONFIDENCE, FALLBACK_PROVIDER, TEMPLATED_CONFIDENCE,
};
