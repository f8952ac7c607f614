//! Gateway-level configuration: breaker defaults, per-provider overrides and
//! degradation settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::breaker::{CircuitBreakerConfig, CircuitBreakerOverrides};
use super::schema::validate_gateway_schema;
use super::ConfigError;
use crate::fallback::TemplateSet;

/// Breaker section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakerSection {
    /// Overrides applied on top of the built-in defaults
    #[serde(default)]
    pub default: CircuitBreakerOverrides,

    /// Per-provider overrides applied on top of `default`
    #[serde(default)]
    pub providers: BTreeMap<String, CircuitBreakerOverrides>,
}

/// Custom answer templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical: Option<String>,
}

/// Degradation section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationSection {
    /// Generative providers in priority order
    #[serde(default = "default_generative_providers")]
    pub generative_providers: Vec<String>,

    #[serde(default)]
    pub templates: TemplateOverrides,
}

fn default_generative_providers() -> Vec<String> {
    ["openai", "anthropic", "groq"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for DegradationSection {
    fn default() -> Self {
        Self {
            generative_providers: default_generative_providers(),
            templates: TemplateOverrides::default(),
        }
    }
}

/// Complete resilience configuration for one gateway process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub breakers: BreakerSection,

    #[serde(default)]
    pub degradation: DegradationSection,
}

impl GatewayConfig {
    /// Parse a config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Self::from_value(serde_json::Value::Null);
        }
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Load a config file, picking the format from its extension.
    ///
    /// `.json` files are parsed as JSON; anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        // An empty YAML document parses as null
        let value = if value.is_null() {
            serde_json::json!({})
        } else {
            value
        };

        validate_gateway_schema(&value).map_err(ConfigError::Schema)?;

        let config: GatewayConfig = serde_json::from_value(value)?;
        config.validate()?;

        tracing::debug!(
            overrides = config.breakers.providers.len(),
            generative = ?config.degradation.generative_providers,
            "Loaded gateway config"
        );
        Ok(config)
    }

    /// Validate resolved breaker configs and templates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_breaker().validate()?;

        for name in self.breakers.providers.keys() {
            self.breaker_for(name)
                .validate()
                .map_err(|e| e.for_provider(name))?;
        }

        self.templates()?;
        Ok(())
    }

    /// Built-in defaults with the `default` overrides applied.
    pub fn default_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::default().merged(&self.breakers.default)
    }

    /// Resolved breaker config for a provider.
    pub fn breaker_for(&self, provider: &str) -> CircuitBreakerConfig {
        let base = self.default_breaker();
        match self.breakers.providers.get(provider) {
            Some(overrides) => base.merged(overrides),
            None => base,
        }
    }

    /// Resolved breaker configs for every provider with explicit overrides.
    pub fn provider_breakers(&self) -> BTreeMap<String, CircuitBreakerConfig> {
        self.breakers
            .providers
            .keys()
            .map(|name| (name.clone(), self.breaker_for(name)))
            .collect()
    }

    /// Answer templates with any overrides applied.
    pub fn templates(&self) -> Result<TemplateSet, ConfigError> {
        let overrides = &self.degradation.templates;
        TemplateSet::with_overrides(overrides.general.as_deref(), overrides.technical.as_deref())
            .map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SAMPLE: &str = r#"
breakers:
  default:
    failure_threshold: 4
    recovery_timeout: 30s
  providers:
    openai:
      failure_threshold: 2
      timeout: 500ms
    groq:
      recovery_timeout: 1.5
degradation:
  generative_providers: [openai, groq]
"#;

    #[test]
    fn test_parse_yaml_with_overrides() {
        let config = GatewayConfig::from_yaml(SAMPLE).unwrap();

        let default = config.default_breaker();
        assert_eq!(default.failure_threshold, 4);
        assert_eq!(default.recovery_timeout, Duration::from_secs(30));
        assert_eq!(default.success_threshold, 3);

        let openai = config.breaker_for("openai");
        assert_eq!(openai.failure_threshold, 2);
        assert_eq!(openai.timeout, Duration::from_millis(500));
        assert_eq!(openai.recovery_timeout, Duration::from_secs(30));

        let groq = config.breaker_for("groq");
        assert_eq!(groq.recovery_timeout, Duration::from_millis(1500));
        assert_eq!(groq.failure_threshold, 4);

        assert_eq!(config.degradation.generative_providers, vec!["openai", "groq"]);
        assert_eq!(config.provider_breakers().len(), 2);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = GatewayConfig::from_yaml("").unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(
            config.degradation.generative_providers,
            vec!["openai", "anthropic", "groq"]
        );
    }

    #[test]
    fn test_schema_violation_is_reported() {
        let result = GatewayConfig::from_yaml("breakers:\n  default:\n    failure_threshold: -1\n");
        assert!(matches!(result, Err(ConfigError::Schema(_))));
    }

    #[test]
    fn test_semantic_violation_names_provider() {
        let yaml = r#"
breakers:
  providers:
    openai:
      max_failures_per_window: 5000
"#;
        let err = GatewayConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn test_huge_duration_is_error_not_panic() {
        let result = GatewayConfig::from_yaml("breakers:\n  default:\n    recovery_timeout: 1e30\n");
        match result {
            Err(ConfigError::JsonError(e)) => assert!(e.to_string().contains("invalid duration")),
            other => panic!("expected a duration error, got {:?}", other),
        }
    }

    #[test]
    fn test_provider_errors_are_prefixed() {
        let err = ConfigError::InvalidValue {
            field: "timeout".to_string(),
            reason: "must be positive".to_string(),
        }
        .for_provider("groq");
        assert_eq!(
            err.to_string(),
            "Invalid value for breakers.providers.groq.timeout: must be positive"
        );
    }

    #[test]
    fn test_bad_template_rejected() {
        let yaml = r#"
degradation:
  templates:
    general: "Answer for {query}: {nonsense}"
"#;
        let result = GatewayConfig::from_yaml(yaml);
        assert!(matches!(result, Err(ConfigError::Template(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let config = GatewayConfig::from_yaml(SAMPLE).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = GatewayConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
