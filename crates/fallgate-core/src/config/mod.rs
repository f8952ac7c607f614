//! Resilience configuration.
//!
//! Config files are YAML or JSON, validated against an embedded JSON Schema
//! before typed deserialization, then checked semantically.

mod breaker;
pub(crate) mod duration;
mod gateway;
mod schema;

pub use breaker::{CircuitBreakerConfig, CircuitBreakerOverrides};
pub use gateway::{BreakerSection, DegradationSection, GatewayConfig, TemplateOverrides};
pub use schema::validate_gateway_schema;

use thiserror::Error;

use crate::fallback::TemplateError;

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config does not match schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid template: {0}")]
    Template(#[from] TemplateError),
}

impl ConfigError {
    /// Prefix an `InvalidValue` field with the provider it belongs to.
    pub fn for_provider(self, provider: &str) -> Self {
        match self {
            ConfigError::InvalidValue { field, reason } => ConfigError::InvalidValue {
                field: format!("breakers.providers.{}.{}", provider, field),
                reason,
            },
            other => other,
        }
    }
}
