//! Resilience patterns for fallgate-runtime.
//!
//! This module provides:
//! - Per-provider circuit breakers with a sliding failure window
//! - A registry that owns the breakers and runs ordered provider fallback
//! - The error taxonomy shared by both

mod circuit_breaker;
mod error;
mod registry;
mod window;

pub use circuit_breaker::{BreakerStatus, CircuitBreaker, CircuitBreakerStats};
pub use error::{BoxError, CircuitError, FallbackError};
pub use registry::CircuitBreakerRegistry;
pub use window::SlidingWindow;
