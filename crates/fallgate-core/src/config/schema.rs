//! JSON Schema validation for gateway configuration files.
//!
//! The schema is embedded at compile time and compiled once on first use.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded gateway config schema.
const GATEWAY_SCHEMA_JSON: &str = include_str!("../../schema/gateway.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema loading.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(GATEWAY_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a gateway config value against the schema.
///
/// Returns every violation, each rendered with its instance path.
pub fn validate_gateway_schema(config: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(config)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_compiles() {
        assert!(get_validator().is_ok());
    }

    #[test]
    fn test_accepts_minimal_config() {
        assert!(validate_gateway_schema(&json!({})).is_ok());
        assert!(validate_gateway_schema(&json!({
            "breakers": {
                "default": { "failure_threshold": 3, "timeout": "500ms" },
                "providers": { "openai": { "recovery_timeout": 10 } }
            },
            "degradation": { "generative_providers": ["openai", "groq"] }
        }))
        .is_ok());
    }

    #[test]
    fn test_reports_violations() {
        let errors = validate_gateway_schema(&json!({
            "breakers": { "default": { "failure_threshold": 0 } },
            "unexpected": true
        }))
        .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("/breakers/default/failure_threshold")));
    }

    #[test]
    fn test_rejects_duplicate_providers() {
        let result = validate_gateway_schema(&json!({
            "degradation": { "generative_providers": ["openai", "openai"] }
        }));
        assert!(result.is_err());
    }
}
