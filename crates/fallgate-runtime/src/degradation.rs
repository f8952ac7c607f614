//! Health classification and retrieval-only answers.
//!
//! The controller never calls a generative provider. It reads breaker state
//! from the registry to decide whether generation is worth attempting, and
//! builds templated answers from already-retrieved sources when it is not.
//!
//! [`DegradationController::generate_fallback`] never fails: template errors
//! and panics while composing both end in the emergency response.

use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use fallgate_core::{
    CircuitState, ConfigError, DegradationLevel, FallbackComposer, FallbackResponse,
    GatewayConfig, SourceRecord, TemplateError, TraceId, FALLBACK_PROVIDER,
};

use crate::events::{EventSink, ResilienceEvent};
use crate::resilience::{BreakerStatus, CircuitBreakerRegistry};

/// Answer used when even the templated path cannot produce one.
pub const EMERGENCY_MESSAGE: &str = "We're having trouble generating a full answer right now. \
Please try again in a few minutes. If the problem persists, contact support with the trace ID below.";

/// Builds the templated answer. Implemented by [`FallbackComposer`].
pub trait AnswerComposer: Send + Sync {
    fn compose(
        &self,
        query: &str,
        sources: &[SourceRecord],
        trace_id: &TraceId,
        error: Option<String>,
    ) -> Result<FallbackResponse, TemplateError>;
}

impl AnswerComposer for FallbackComposer {
    fn compose(
        &self,
        query: &str,
        sources: &[SourceRecord],
        trace_id: &TraceId,
        error: Option<String>,
    ) -> Result<FallbackResponse, TemplateError> {
        FallbackComposer::compose(self, query, sources, trace_id, error)
    }
}

/// Whether to skip generation for a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackDecision {
    pub use_fallback: bool,
    pub level: DegradationLevel,
    pub reason: String,
}

/// Health of one generative provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub name: String,
    /// None when the provider has never been called
    pub state: Option<CircuitState>,
    pub available: bool,
    pub recovery_due: bool,
}

/// Health endpoint payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub level: DegradationLevel,
    pub generative: Vec<ProviderHealth>,
    pub breakers: BTreeMap<String, BreakerStatus>,
}

/// Decides when to degrade and produces degraded answers.
pub struct DegradationController {
    registry: Arc<CircuitBreakerRegistry>,
    generative_providers: Vec<String>,
    composer: Arc<dyn AnswerComposer>,
    events: Arc<dyn EventSink>,
}

impl DegradationController {
    /// Create a controller with the built-in templates.
    pub fn new(
        registry: Arc<CircuitBreakerRegistry>,
        generative_providers: Vec<String>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            generative_providers,
            composer: Arc::new(FallbackComposer::default()),
            events,
        }
    }

    /// Create a controller from the degradation section of a gateway config.
    pub fn from_config(
        registry: Arc<CircuitBreakerRegistry>,
        config: &GatewayConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        let composer = FallbackComposer::new(config.templates()?);
        Ok(Self::new(registry, config.degradation.generative_providers.clone(), events)
            .with_composer(Arc::new(composer)))
    }

    /// Replace the answer composer.
    pub fn with_composer(mut self, composer: Arc<dyn AnswerComposer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn generative_providers(&self) -> &[String] {
        &self.generative_providers
    }

    /// `Full` if any generative provider would admit a call.
    ///
    /// Providers without a breaker yet count as available, as does an Open
    /// breaker whose recovery timeout has passed. Retrieval health is not
    /// visible here; see [`assess_health_with_retrieval`](Self::assess_health_with_retrieval).
    pub fn assess_health(&self) -> DegradationLevel {
        let any_available = self.provider_health().iter().any(|p| p.available);
        if any_available {
            DegradationLevel::Full
        } else {
            DegradationLevel::GenerativeDegraded
        }
    }

    /// `Emergency` when the caller reports retrieval down, otherwise
    /// [`assess_health`](Self::assess_health).
    pub fn assess_health_with_retrieval(&self, retrieval_available: bool) -> DegradationLevel {
        if retrieval_available {
            self.assess_health()
        } else {
            DegradationLevel::Emergency
        }
    }

    /// Decide whether to skip generation for `query`. Not cached.
    pub fn should_use_fallback(&self, query: &str) -> FallbackDecision {
        let level = self.assess_health();
        let decision = match level {
            DegradationLevel::Full => FallbackDecision {
                use_fallback: false,
                level,
                reason: "generative providers available".to_string(),
            },
            _ if self.generative_providers.is_empty() => FallbackDecision {
                use_fallback: true,
                level,
                reason: "no generative providers configured".to_string(),
            },
            _ => FallbackDecision {
                use_fallback: true,
                level,
                reason: "all generative provider circuits open".to_string(),
            },
        };

        tracing::debug!(
            query_len = query.len(),
            use_fallback = decision.use_fallback,
            reason = %decision.reason,
            "Fallback decision"
        );
        decision
    }

    /// Build a retrieval-only answer. Never fails.
    pub fn generate_fallback(
        &self,
        query: &str,
        sources: &[SourceRecord],
        error: Option<&str>,
        trace_id: &TraceId,
    ) -> FallbackResponse {
        let composer = &self.composer;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            composer.compose(query, sources, trace_id, error.map(str::to_string))
        }));

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(trace_id = %trace_id, error = %e, "Fallback template failed");
                self.emergency_response(trace_id, Some(format!("fallback template failed: {}", e)))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(trace_id = %trace_id, panic = %message, "Fallback composition panicked");
                self.emergency_response(
                    trace_id,
                    Some(format!("fallback composition panicked: {}", message)),
                )
            }
        };

        self.events.record(ResilienceEvent::FallbackResponseGenerated {
            provider: FALLBACK_PROVIDER.to_string(),
            trace_id: trace_id.clone(),
            sources_count: sources.len(),
            template: response.template().unwrap_or("emergency").to_string(),
            degradation_level: response.degradation_level,
        });

        response
    }

    /// The hand-written emergency answer.
    pub fn emergency_response(&self, trace_id: &TraceId, error: Option<String>) -> FallbackResponse {
        FallbackResponse::emergency(EMERGENCY_MESSAGE, trace_id, error)
    }

    /// Per-provider health plus the full breaker snapshot.
    pub fn health_report(&self) -> HealthReport {
        let breakers = self.registry.status_snapshot();
        let generative = self.provider_health_from(&breakers);
        let level = if generative.iter().any(|p| p.available) {
            DegradationLevel::Full
        } else {
            DegradationLevel::GenerativeDegraded
        };

        HealthReport {
            level,
            generative,
            breakers,
        }
    }

    fn provider_health(&self) -> Vec<ProviderHealth> {
        self.generative_providers
            .iter()
            .map(|name| match self.registry.get(name) {
                Some(breaker) => Self::health_of(name, &breaker.status()),
                None => Self::untouched(name),
            })
            .collect()
    }

    fn provider_health_from(&self, breakers: &BTreeMap<String, BreakerStatus>) -> Vec<ProviderHealth> {
        self.generative_providers
            .iter()
            .map(|name| match breakers.get(name) {
                Some(status) => Self::health_of(name, status),
                None => Self::untouched(name),
            })
            .collect()
    }

    fn health_of(name: &str, status: &BreakerStatus) -> ProviderHealth {
        ProviderHealth {
            name: name.to_string(),
            state: Some(status.state),
            available: status.admits_calls(),
            recovery_due: status.recovery_due,
        }
    }

    fn untouched(name: &str) -> ProviderHealth {
        ProviderHealth {
            name: name.to_string(),
            state: None,
            available: true,
            recovery_due: false,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventSink;
    use fallgate_core::{CircuitBreakerConfig, EMERGENCY_CONFIDENCE, TEMPLATED_CONFIDENCE};
    use std::time::Duration;

    fn setup(providers: &[&str]) -> (DegradationController, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::new());
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(10),
            ..Default::default()
        };
        let registry = Arc::new(CircuitBreakerRegistry::new(config, sink.clone()).unwrap());
        let controller = DegradationController::new(
            registry,
            providers.iter().map(|s| s.to_string()).collect(),
            sink.clone(),
        );
        (controller, sink)
    }

    async fn trip(controller: &DegradationController, provider: &str) {
        let _ = controller
            .registry()
            .breaker(provider)
            .call(|| async { Err::<(), _>(anyhow::anyhow!("down")) })
            .await;
    }

    fn sources() -> Vec<SourceRecord> {
        vec![
            SourceRecord::new(
                "Fixing connection reset errors",
                "https://docs.example.com/errors/reset",
                "docs.example.com",
                "Connection reset errors usually mean the upstream closed the socket. Increase the keepalive timeout to fix it.",
            ),
            SourceRecord::new(
                "Networking basics",
                "https://www.networking.org/basics",
                "",
                "A socket is one endpoint of a two-way communication link.",
            ),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_levels() {
        let (controller, _) = setup(&["openai", "anthropic"]);
        assert_eq!(controller.assess_health(), DegradationLevel::Full);

        trip(&controller, "openai").await;
        assert_eq!(controller.assess_health(), DegradationLevel::Full);

        trip(&controller, "anthropic").await;
        assert_eq!(controller.assess_health(), DegradationLevel::GenerativeDegraded);
        assert_eq!(
            controller.assess_health_with_retrieval(false),
            DegradationLevel::Emergency
        );

        // Recovery due: the next call would be a trial
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(controller.assess_health(), DegradationLevel::Full);
    }

    #[test]
    fn test_empty_provider_list_is_degraded() {
        let (controller, _) = setup(&[]);
        assert_eq!(controller.assess_health(), DegradationLevel::GenerativeDegraded);

        let decision = controller.should_use_fallback("anything");
        assert!(decision.use_fallback);
        assert_eq!(decision.reason, "no generative providers configured");
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_use_fallback_tracks_health() {
        let (controller, _) = setup(&["openai"]);
        assert!(!controller.should_use_fallback("hello").use_fallback);

        trip(&controller, "openai").await;
        let decision = controller.should_use_fallback("hello");
        assert!(decision.use_fallback);
        assert_eq!(decision.level, DegradationLevel::GenerativeDegraded);
        assert_eq!(decision.reason, "all generative provider circuits open");
    }

    #[test]
    fn test_generate_fallback_is_deterministic() {
        let (controller, sink) = setup(&["openai"]);
        let trace = TraceId::new("trace-7");

        let first = controller.generate_fallback("how do I fix a connection reset error", &sources(), None, &trace);
        let second = controller.generate_fallback("how do I fix a connection reset error", &sources(), None, &trace);

        assert_eq!(first, second);
        assert_eq!(first.template(), Some("technical"));
        assert_eq!(first.confidence, TEMPLATED_CONFIDENCE);
        assert_eq!(first.degradation_level, DegradationLevel::GenerativeDegraded);
        assert!(first.answer.ends_with("Trace ID: trace-7"));
        assert_eq!(first.provider, FALLBACK_PROVIDER);

        assert_eq!(sink.count("fallback_response_generated"), 2);
        match &sink.events()[0] {
            ResilienceEvent::FallbackResponseGenerated {
                sources_count,
                template,
                ..
            } => {
                assert_eq!(*sources_count, 2);
                assert_eq!(template, "technical");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_general_query_with_no_sources() {
        let (controller, _) = setup(&["openai"]);
        let response = controller.generate_fallback(
            "who painted the mona lisa",
            &[],
            Some("generation failed: timeout"),
            &TraceId::new("t"),
        );

        assert_eq!(response.template(), Some("general"));
        assert!(response.sources.is_empty());
        assert!(response.answer.contains("No sources available."));
        assert_eq!(response.confidence, TEMPLATED_CONFIDENCE);
        assert_eq!(response.error.as_deref(), Some("generation failed: timeout"));
    }

    #[test]
    fn test_template_error_routes_to_emergency() {
        let (controller, _) = setup(&["openai"]);
        let templates = fallgate_core::TemplateSet::with_overrides(
            Some("{query}: {technical_points}"),
            None,
        )
        .unwrap();
        let controller = controller.with_composer(Arc::new(FallbackComposer::new(templates)));

        let response = controller.generate_fallback("what is rust", &sources(), None, &TraceId::new("t-9"));
        assert_eq!(response.degradation_level, DegradationLevel::Emergency);
        assert_eq!(response.confidence, EMERGENCY_CONFIDENCE);
        assert!(response.answer.ends_with("Trace ID: t-9"));
        assert!(response.error.unwrap().starts_with("fallback template failed"));
    }

    struct PanickingComposer;

    impl AnswerComposer for PanickingComposer {
        fn compose(
            &self,
            _query: &str,
            _sources: &[SourceRecord],
            _trace_id: &TraceId,
            _error: Option<String>,
        ) -> Result<FallbackResponse, TemplateError> {
            panic!("summary exploded")
        }
    }

    #[test]
    fn test_panic_routes_to_emergency() {
        let (controller, sink) = setup(&["openai"]);
        let controller = controller.with_composer(Arc::new(PanickingComposer));

        let response = controller.generate_fallback("q", &sources(), None, &TraceId::new("p-1"));
        assert_eq!(response.degradation_level, DegradationLevel::Emergency);
        assert_eq!(response.trace_id.as_str(), "p-1");
        assert_eq!(
            response.error.as_deref(),
            Some("fallback composition panicked: summary exploded")
        );
        assert_eq!(sink.count("fallback_response_generated"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_report_serializes() {
        let (controller, _) = setup(&["openai", "groq"]);
        trip(&controller, "openai").await;

        let report = controller.health_report();
        assert_eq!(report.level, DegradationLevel::Full);
        assert_eq!(report.generative[0].state, Some(CircuitState::Open));
        assert!(!report.generative[0].available);
        assert_eq!(report.generative[1].state, None);
        assert!(report.generative[1].available);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["breakers"]["openai"]["state"], "open");
    }

    #[test]
    fn test_from_config_uses_configured_providers() {
        let config = GatewayConfig::from_yaml("degradation:\n  generative_providers: [local]\n").unwrap();
        let registry = Arc::new(CircuitBreakerRegistry::default());
        let controller =
            DegradationController::from_config(registry, &config, Arc::new(MemoryEventSink::new())).unwrap();
        assert_eq!(controller.generative_providers(), ["local".to_string()]);
    }
}
