//! Assembles a [`FallbackResponse`] from a query and retrieved sources.

use serde_json::json;
use std::collections::BTreeMap;

use super::classifier::{classify_query, QueryKind};
use super::summary::{
    build_summary, extract_technical_points, format_references, format_technical_points,
    MAX_REFERENCES, MAX_TECHNICAL_POINTS,
};
use super::template::{TemplateError, TemplateSet, TemplateValues};
use crate::types::{
    DegradationLevel, FallbackResponse, SourceRecord, TraceId, FALLBACK_PROVIDER,
    TEMPLATED_CONFIDENCE,
};

/// Builds retrieval-only answers. Pure and deterministic.
#[derive(Debug, Clone, Default)]
pub struct FallbackComposer {
    templates: TemplateSet,
}

impl FallbackComposer {
    pub fn new(templates: TemplateSet) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Compose a templated answer.
    ///
    /// The trace id is always appended, whether or not the template
    /// references `{trace_id}`.
    pub fn compose(
        &self,
        query: &str,
        sources: &[SourceRecord],
        trace_id: &TraceId,
        error: Option<String>,
    ) -> Result<FallbackResponse, TemplateError> {
        let kind = classify_query(query);
        let template = self.templates.for_kind(kind);

        let cited: Vec<SourceRecord> = sources.iter().take(MAX_REFERENCES).cloned().collect();
        let summary = build_summary(&cited);

        let technical_points = match kind {
            QueryKind::Technical => Some(format_technical_points(&extract_technical_points(
                &cited,
                MAX_TECHNICAL_POINTS,
            ))),
            QueryKind::General => None,
        };

        let values = TemplateValues {
            query: query.trim().to_string(),
            summary: summary.text,
            domains: if summary.domains.is_empty() {
                "none".to_string()
            } else {
                summary.domains.join(", ")
            },
            references: format_references(&cited),
            technical_points,
            source_count: sources.len(),
            trace_id: trace_id.to_string(),
        };

        let body = template.render(&values)?;
        let answer = format!("{}\n\nTrace ID: {}", body.trim_end(), trace_id);

        let mut metadata = BTreeMap::new();
        metadata.insert("template".to_string(), json!(template.name()));
        metadata.insert("query_kind".to_string(), json!(kind.as_str()));
        metadata.insert("source_count".to_string(), json!(sources.len()));
        metadata.insert("cited_count".to_string(), json!(cited.len()));
        metadata.insert("snippet_count".to_string(), json!(summary.snippet_count));

        Ok(FallbackResponse {
            answer,
            sources: cited,
            provider: FALLBACK_PROVIDER.to_string(),
            confidence: TEMPLATED_CONFIDENCE,
            degradation_level: DegradationLevel::GenerativeDegraded,
            trace_id: trace_id.clone(),
            error,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<SourceRecord> {
        vec![
            SourceRecord::new(
                "Tokio timeouts",
                "https://docs.rs/tokio/latest/tokio/time/fn.timeout.html",
                "docs.rs",
                "Requires a future to complete before the specified duration has elapsed. \
                 If the future completes first, its output is returned.",
            ),
            SourceRecord::new(
                "Stack Overflow answer",
                "https://stackoverflow.com/q/1",
                "",
                "The error happens because the runtime was dropped. Call `block_on` from \
                 the main thread instead.",
            ),
        ]
    }

    #[test]
    fn test_general_query_uses_general_template() {
        let composer = FallbackComposer::default();
        let trace = TraceId::new("abc");
        let response = composer
            .compose("tell me about tokio timers", &sources(), &trace, None)
            .unwrap();

        assert_eq!(response.template(), Some("general"));
        assert_eq!(response.confidence, TEMPLATED_CONFIDENCE);
        assert_eq!(response.provider, FALLBACK_PROVIDER);
        assert_eq!(response.sources.len(), 2);
        assert!(response.answer.contains("[1] Tokio timeouts (docs.rs)"));
        assert!(response.answer.contains("docs.rs, stackoverflow.com"));
        assert!(!response.answer.contains("Key technical points"));
        assert!(response.answer.ends_with("Trace ID: abc"));
    }

    #[test]
    fn test_technical_query_extracts_points() {
        let composer = FallbackComposer::default();
        let response = composer
            .compose("how to fix runtime dropped error", &sources(), &TraceId::new("t"), None)
            .unwrap();

        assert_eq!(response.template(), Some("technical"));
        assert!(response.answer.contains("Key technical points:"));
        assert!(response
            .answer
            .contains("- The error happens because the runtime was dropped"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let composer = FallbackComposer::default();
        let trace = TraceId::new("same");
        let a = composer.compose("why is my build slow", &sources(), &trace, None).unwrap();
        let b = composer.compose("why is my build slow", &sources(), &trace, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_sources() {
        let composer = FallbackComposer::default();
        let response = composer
            .compose("capital of France", &[], &TraceId::new("x"), Some("down".into()))
            .unwrap();

        assert!(response.answer.contains("No sources were found"));
        assert!(response.sources.is_empty());
        assert_eq!(response.confidence, 0.5);
        assert_eq!(response.error.as_deref(), Some("down"));
    }

    #[test]
    fn test_references_capped_at_ten() {
        let many: Vec<_> = (0..15)
            .map(|i| SourceRecord::new(format!("T{}", i), "", format!("d{}.com", i), "words"))
            .collect();
        let response = FallbackComposer::default()
            .compose("anything", &many, &TraceId::new("x"), None)
            .unwrap();

        assert_eq!(response.sources.len(), MAX_REFERENCES);
        assert_eq!(response.metadata["source_count"], json!(15));
    }

    #[test]
    fn test_custom_template_missing_value_fails() {
        let templates = TemplateSet::with_overrides(Some("{summary}\n{technical_points}"), None)
            .unwrap();
        let composer = FallbackComposer::new(templates);
        let result = composer.compose("plain question", &sources(), &TraceId::new("x"), None);
        assert!(matches!(result, Err(TemplateError::MissingValue { .. })));
    }
}
