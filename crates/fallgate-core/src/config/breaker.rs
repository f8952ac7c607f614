//! Circuit breaker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{duration, ConfigError};

/// Immutable settings for one provider's circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time after the last failure before a trial call is allowed
    #[serde(with = "duration")]
    pub recovery_timeout: Duration,

    /// Trial successes needed to close the circuit again
    pub success_threshold: u32,

    /// Deadline for a single protected call
    #[serde(with = "duration")]
    pub timeout: Duration,

    /// Trailing interval over which failures are counted
    #[serde(with = "duration")]
    pub window_size: Duration,

    /// Failures tolerated inside `window_size` before opening
    pub max_failures_per_window: u32,

    /// Upper bound on retained window entries
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
}

fn default_window_capacity() -> usize {
    1024
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            timeout: Duration::from_secs(30),
            window_size: Duration::from_secs(300),
            max_failures_per_window: 10,
            window_capacity: default_window_capacity(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Check that every setting is positive and the window can hold enough
    /// entries to detect a breach.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| {
            Err(ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.failure_threshold == 0 {
            return invalid("failure_threshold", "must be positive");
        }
        if self.success_threshold == 0 {
            return invalid("success_threshold", "must be positive");
        }
        if self.max_failures_per_window == 0 {
            return invalid("max_failures_per_window", "must be positive");
        }
        if self.recovery_timeout.is_zero() {
            return invalid("recovery_timeout", "must be positive");
        }
        if self.timeout.is_zero() {
            return invalid("timeout", "must be positive");
        }
        if self.window_size.is_zero() {
            return invalid("window_size", "must be positive");
        }
        if self.window_capacity <= self.max_failures_per_window as usize {
            return invalid(
                "window_capacity",
                "must be greater than max_failures_per_window",
            );
        }

        Ok(())
    }

    /// Apply a partial override on top of this config.
    pub fn merged(&self, overrides: &CircuitBreakerOverrides) -> Self {
        Self {
            failure_threshold: overrides.failure_threshold.unwrap_or(self.failure_threshold),
            recovery_timeout: overrides.recovery_timeout.unwrap_or(self.recovery_timeout),
            success_threshold: overrides.success_threshold.unwrap_or(self.success_threshold),
            timeout: overrides.timeout.unwrap_or(self.timeout),
            window_size: overrides.window_size.unwrap_or(self.window_size),
            max_failures_per_window: overrides
                .max_failures_per_window
                .unwrap_or(self.max_failures_per_window),
            window_capacity: overrides.window_capacity.unwrap_or(self.window_capacity),
        }
    }
}

/// Per-provider settings; unset fields inherit from the default config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    #[serde(default, with = "duration::option", skip_serializing_if = "Option::is_none")]
    pub recovery_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<u32>,

    #[serde(default, with = "duration::option", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default, with = "duration::option", skip_serializing_if = "Option::is_none")]
    pub window_size: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failures_per_window: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_capacity: Option<usize>,
}
