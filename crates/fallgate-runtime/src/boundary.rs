//! Single entry point for request handlers when something upstream fails.

use std::fmt::Display;
use std::sync::Arc;

use fallgate_core::{FallbackResponse, SourceRecord, TraceId};

use crate::degradation::DegradationController;
use crate::events::{EventSink, ResilienceEvent};

/// Shown when retrieval itself failed and there is nothing to summarize.
pub const RETRIEVAL_UNAVAILABLE_MESSAGE: &str = "Search is temporarily unavailable, so no sources \
could be retrieved for your question. Please try again in a few minutes.";

/// Turns generative and retrieval failures into user-facing responses.
pub struct ErrorBoundary {
    controller: Arc<DegradationController>,
    events: Arc<dyn EventSink>,
}

impl ErrorBoundary {
    pub fn new(controller: Arc<DegradationController>, events: Arc<dyn EventSink>) -> Self {
        Self { controller, events }
    }

    pub fn controller(&self) -> &Arc<DegradationController> {
        &self.controller
    }

    /// Generation failed; answer from the sources instead.
    ///
    /// `provider` is the last provider tried, when there was one.
    pub fn handle_generative_error(
        &self,
        query: &str,
        sources: &[SourceRecord],
        provider: Option<&str>,
        error: &dyn Display,
        trace_id: &TraceId,
    ) -> FallbackResponse {
        let error = error.to_string();
        self.events.record(ResilienceEvent::GenerativeErrorHandled {
            provider: provider.map(str::to_string),
            trace_id: trace_id.clone(),
            error: error.clone(),
        });

        let cause = format!("generation failed: {}", error);
        self.controller
            .generate_fallback(query, sources, Some(&cause), trace_id)
    }

    /// Retrieval failed; no template, no sources.
    pub fn handle_retrieval_error(
        &self,
        query: &str,
        error: &dyn Display,
        trace_id: &TraceId,
    ) -> FallbackResponse {
        let error = error.to_string();
        tracing::debug!(trace_id = %trace_id, query_len = query.len(), "Answering without retrieval");
        self.events.record(ResilienceEvent::RetrievalErrorHandled {
            provider: None,
            trace_id: trace_id.clone(),
            error: error.clone(),
        });

        FallbackResponse::emergency(
            RETRIEVAL_UNAVAILABLE_MESSAGE,
            trace_id,
            Some(format!("retrieval failed: {}", error)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventSink;
    use crate::resilience::CircuitBreakerRegistry;
    use fallgate_core::{DegradationLevel, EMERGENCY_CONFIDENCE, TEMPLATED_CONFIDENCE};

    fn boundary() -> (ErrorBoundary, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::new());
        let controller = Arc::new(DegradationController::new(
            Arc::new(CircuitBreakerRegistry::default()),
            vec!["openai".to_string()],
            sink.clone(),
        ));
        (ErrorBoundary::new(controller, sink.clone()), sink)
    }

    #[test]
    fn test_generative_error_uses_templated_fallback() {
        let (boundary, sink) = boundary();
        let sources = vec![SourceRecord::new(
            "Tides",
            "https://oceans.example.org/tides",
            "oceans.example.org",
            "Tides are caused by the gravitational pull of the moon and the sun.",
        )];

        let response = boundary.handle_generative_error(
            "what causes tides",
            &sources,
            Some("anthropic"),
            &"upstream 503",
            &TraceId::new("g-1"),
        );

        assert_eq!(response.degradation_level, DegradationLevel::GenerativeDegraded);
        assert_eq!(response.confidence, TEMPLATED_CONFIDENCE);
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.error.as_deref(), Some("generation failed: upstream 503"));
        assert_eq!(
            sink.names(),
            vec!["generative_error_handled", "fallback_response_generated"]
        );
        assert_eq!(sink.events()[0].provider(), Some("anthropic"));
    }

    #[test]
    fn test_generative_error_without_provider() {
        let (boundary, sink) = boundary();
        let response =
            boundary.handle_generative_error("q", &[], None, &"no providers", &TraceId::new("g-2"));

        assert_eq!(response.error.as_deref(), Some("generation failed: no providers"));
        let json = serde_json::to_value(&sink.events()[0]).unwrap();
        assert_eq!(json["event"], "generative_error_handled");
        assert!(json["provider"].is_null());
    }

    #[test]
    fn test_retrieval_error_is_emergency() {
        let (boundary, sink) = boundary();
        let response =
            boundary.handle_retrieval_error("what causes tides", &"index offline", &TraceId::new("r-1"));

        assert_eq!(response.degradation_level, DegradationLevel::Emergency);
        assert_eq!(response.confidence, EMERGENCY_CONFIDENCE);
        assert!(response.sources.is_empty());
        assert!(response.answer.starts_with(RETRIEVAL_UNAVAILABLE_MESSAGE));
        assert!(response.answer.ends_with("Trace ID: r-1"));
        assert_eq!(response.error.as_deref(), Some("retrieval failed: index offline"));
        assert_eq!(sink.names(), vec!["retrieval_error_handled"]);
        assert_eq!(sink.events()[0].provider(), None);
    }
}
