//! Core types shared by the configuration, fallback and runtime layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Provider label stamped on every synthesized answer.
pub const FALLBACK_PROVIDER: &str = "fallback_free_tier";

/// Confidence for answers assembled from retrieved snippets.
///
/// Signals "machine-assembled, not model-verified", not factual certainty.
pub const TEMPLATED_CONFIDENCE: f64 = 0.5;

/// Confidence for the hand-written emergency answers.
pub const EMERGENCY_CONFIDENCE: f64 = 0.1;

/// State of a single provider's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,

    /// Calls are rejected without attempting the operation
    Open,

    /// A limited number of trial calls test recovery
    HalfOpen,
}

impl CircuitState {
    /// Stable lowercase name, as rendered in snapshots and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::Closed
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of how much capability is currently available.
///
/// Always derived from live breaker state, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// At least one generative provider is reachable
    Full,

    /// No generative provider is currently admitting calls
    GenerativeDegraded,

    /// Both generative and retrieval paths are failing
    Emergency,
}

impl DegradationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationLevel::Full => "full",
            DegradationLevel::GenerativeDegraded => "generative_degraded",
            DegradationLevel::Emergency => "emergency",
        }
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque correlation id attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// Wrap an id supplied by the caller.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TraceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A document already produced by the retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Document title
    #[serde(default)]
    pub title: String,

    /// Canonical URL
    #[serde(default)]
    pub url: String,

    /// Domain the document was served from (derived from `url` when empty)
    #[serde(default)]
    pub domain: String,

    /// Short text excerpt
    #[serde(default)]
    pub snippet: String,
}

impl SourceRecord {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        domain: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            domain: domain.into(),
            snippet: snippet.into(),
        }
    }

    /// The record's domain, falling back to the URL host.
    pub fn effective_domain(&self) -> Option<String> {
        let domain = self.domain.trim();
        if !domain.is_empty() {
            return Some(domain.to_lowercase());
        }

        url::Url::parse(self.url.trim())
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
    }
}

/// An answer synthesized without calling any generative provider.
///
/// Built fresh per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackResponse {
    /// Answer text shown to the user
    pub answer: String,

    /// Sources referenced by the answer
    pub sources: Vec<SourceRecord>,

    /// Always [`FALLBACK_PROVIDER`]
    pub provider: String,

    /// Fixed low confidence (see [`TEMPLATED_CONFIDENCE`], [`EMERGENCY_CONFIDENCE`])
    pub confidence: f64,

    /// Degradation level the answer was produced under
    pub degradation_level: DegradationLevel,

    /// Correlation id, also embedded in the answer text
    pub trace_id: TraceId,

    /// Human-readable cause, if one was supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Template used, source count, query kind
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl FallbackResponse {
    /// Minimal hand-written answer used when nothing can be summarized.
    pub fn emergency(
        message: impl Into<String>,
        trace_id: &TraceId,
        error: Option<String>,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("template".to_string(), serde_json::json!("emergency"));
        metadata.insert("source_count".to_string(), serde_json::json!(0));

        Self {
            answer: format!("{}\n\nTrace ID: {}", message.into(), trace_id),
            sources: Vec::new(),
            provider: FALLBACK_PROVIDER.to_string(),
            confidence: EMERGENCY_CONFIDENCE,
            degradation_level: DegradationLevel::Emergency,
            trace_id: trace_id.clone(),
            error,
            metadata,
        }
    }

    /// Template name recorded in the metadata, if any.
    pub fn template(&self) -> Option<&str> {
        self.metadata.get("template").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_falls_back_to_url_host() {
        let source = SourceRecord::new("Docs", "https://www.Example.com/a/b", "", "text");
        assert_eq!(source.effective_domain().as_deref(), Some("example.com"));

        let explicit = SourceRecord::new("Docs", "https://example.com", "Docs.RS", "text");
        assert_eq!(explicit.effective_domain().as_deref(), Some("docs.rs"));

        let neither = SourceRecord::new("Docs", "not a url", "", "text");
        assert_eq!(neither.effective_domain(), None);
    }

    #[test]
    fn test_emergency_response_shape() {
        let trace = TraceId::new("trace-1");
        let response = FallbackResponse::emergency("Service unavailable.", &trace, None);

        assert_eq!(response.provider, FALLBACK_PROVIDER);
        assert_eq!(response.confidence, EMERGENCY_CONFIDENCE);
        assert_eq!(response.degradation_level, DegradationLevel::Emergency);
        assert!(response.sources.is_empty());
        assert!(response.answer.ends_with("Trace ID: trace-1"));
        assert_eq!(response.template(), Some("emergency"));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"half_open\"");

        let level: DegradationLevel = serde_json::from_str("\"generative_degraded\"").unwrap();
        assert_eq!(level, DegradationLevel::GenerativeDegraded);
    }
}
