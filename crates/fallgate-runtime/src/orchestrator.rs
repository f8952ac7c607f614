//! Request-level orchestration over generative providers.
//!
//! The gateway implements the full degradation path for one request:
//! - Skip generation entirely when every generative circuit is open
//! - Otherwise try providers in priority order, each behind its breaker
//! - On exhaustion, answer from the retrieved sources
//! - On retrieval failure, return the emergency answer

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use fallgate_core::{ConfigError, FallbackResponse, GatewayConfig, SourceRecord, TraceId};

use crate::boundary::ErrorBoundary;
use crate::degradation::DegradationController;
use crate::events::{EventSink, TracingEventSink};
use crate::providers::{CompletionRequest, GenerativeProvider, ProviderError};
use crate::resilience::CircuitBreakerRegistry;

/// Errors from building a gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("No generative providers registered")]
    NoProviders,

    #[error("Provider registered twice: {0}")]
    DuplicateProvider(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// What the caller gets back for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayAnswer {
    /// A provider answered
    Generated {
        content: String,
        provider: String,
        model: String,
    },

    /// Degraded answer built without a provider
    Fallback(FallbackResponse),
}

impl GatewayAnswer {
    /// Text to show the user.
    pub fn content(&self) -> &str {
        match self {
            GatewayAnswer::Generated { content, .. } => content,
            GatewayAnswer::Fallback(response) => &response.answer,
        }
    }

    /// Provider that produced the answer (`fallback_free_tier` for fallbacks).
    pub fn provider(&self) -> &str {
        match self {
            GatewayAnswer::Generated { provider, .. } => provider,
            GatewayAnswer::Fallback(response) => &response.provider,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, GatewayAnswer::Fallback(_))
    }
}

/// Answers queries through prioritized providers with graceful degradation.
pub struct ResilientGateway {
    providers: Vec<Arc<dyn GenerativeProvider>>,
    registry: Arc<CircuitBreakerRegistry>,
    controller: Arc<DegradationController>,
    boundary: ErrorBoundary,
}

impl ResilientGateway {
    pub fn builder() -> ResilientGatewayBuilder {
        ResilientGatewayBuilder::new()
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn controller(&self) -> &Arc<DegradationController> {
        &self.controller
    }

    /// Provider names in priority order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Answer `query` from already-retrieved `sources`.
    pub async fn answer(
        &self,
        query: &str,
        sources: &[SourceRecord],
        trace_id: &TraceId,
    ) -> GatewayAnswer {
        let decision = self.controller.should_use_fallback(query);
        if decision.use_fallback {
            tracing::info!(trace_id = %trace_id, reason = %decision.reason, "Skipping generation");
            return GatewayAnswer::Fallback(self.controller.generate_fallback(
                query,
                sources,
                Some(&decision.reason),
                trace_id,
            ));
        }

        let request = CompletionRequest::new(query, sources, trace_id);
        let names = self.provider_names();

        let result = self
            .registry
            .call_with_fallback_traced(Some(trace_id), &names, |name| {
                let provider = self.find(&name);
                let request = &request;
                async move {
                    match provider {
                        Some(provider) => provider.complete(request).await,
                        None => Err(ProviderError::NotConfigured(name)),
                    }
                }
            })
            .await;

        match result {
            Ok((response, provider)) => {
                tracing::debug!(
                    trace_id = %trace_id,
                    provider = %provider,
                    tokens = response.usage.total(),
                    "Generated answer"
                );
                GatewayAnswer::Generated {
                    content: response.content,
                    provider,
                    model: response.model,
                }
            }
            Err(e) => {
                let provider = e.attempted().last().map(String::as_str);
                GatewayAnswer::Fallback(
                    self.boundary
                        .handle_generative_error(query, sources, provider, &e, trace_id),
                )
            }
        }
    }

    /// Run retrieval, then answer. A retrieval error yields the emergency
    /// answer without touching any provider.
    pub async fn answer_with_retrieval<R, E>(
        &self,
        query: &str,
        retrieval: R,
        trace_id: &TraceId,
    ) -> GatewayAnswer
    where
        R: Future<Output = Result<Vec<SourceRecord>, E>>,
        E: Display,
    {
        match retrieval.await {
            Ok(sources) => self.answer(query, &sources, trace_id).await,
            Err(e) => {
                GatewayAnswer::Fallback(self.boundary.handle_retrieval_error(query, &e, trace_id))
            }
        }
    }

    fn find(&self, name: &str) -> Option<Arc<dyn GenerativeProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }
}

/// Builder for ResilientGateway.
pub struct ResilientGatewayBuilder {
    providers: Vec<Arc<dyn GenerativeProvider>>,
    config: Option<GatewayConfig>,
    registry: Option<Arc<CircuitBreakerRegistry>>,
    controller: Option<Arc<DegradationController>>,
    events: Option<Arc<dyn EventSink>>,
}

impl ResilientGatewayBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            config: None,
            registry: None,
            controller: None,
            events: None,
        }
    }

    /// Register a provider. Earlier registrations have higher priority.
    pub fn provider(mut self, provider: Arc<dyn GenerativeProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Breaker and degradation settings, used for any part not supplied
    /// explicitly.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn registry(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn controller(mut self, controller: Arc<DegradationController>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the gateway.
    ///
    /// Without a config, the registered provider names double as the
    /// generative provider list used for health assessment.
    pub fn build(self) -> Result<ResilientGateway, GatewayError> {
        if self.providers.is_empty() {
            return Err(GatewayError::NoProviders);
        }

        let mut seen = BTreeSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name().to_string()) {
                return Err(GatewayError::DuplicateProvider(provider.name().to_string()));
            }
        }

        let events = self
            .events
            .unwrap_or_else(|| Arc::new(TracingEventSink) as Arc<dyn EventSink>);

        let registry = match (self.registry, &self.config) {
            (Some(registry), _) => registry,
            (None, Some(config)) => Arc::new(CircuitBreakerRegistry::from_config(config, events.clone())?),
            (None, None) => Arc::new(CircuitBreakerRegistry::new(
                Default::default(),
                events.clone(),
            )?),
        };

        let controller = match (self.controller, &self.config) {
            (Some(controller), _) => controller,
            (None, Some(config)) => Arc::new(DegradationController::from_config(
                registry.clone(),
                config,
                events.clone(),
            )?),
            (None, None) => Arc::new(DegradationController::new(
                registry.clone(),
                self.providers.iter().map(|p| p.name().to_string()).collect(),
                events.clone(),
            )),
        };

        let registered: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        let (unregistered, unmonitored) =
            provider_mismatch(controller.generative_providers(), &registered);
        if !unregistered.is_empty() || !unmonitored.is_empty() {
            tracing::warn!(
                unregistered = ?unregistered,
                unmonitored = ?unmonitored,
                "Generative providers used for health checks differ from registered providers"
            );
        }

        tracing::debug!(providers = self.providers.len(), "Built resilient gateway");

        Ok(ResilientGateway {
            providers: self.providers,
            registry,
            boundary: ErrorBoundary::new(controller.clone(), events),
            controller,
        })
    }
}

/// Names the controller watches but nobody registered, and registered names
/// the controller ignores.
fn provider_mismatch(generative: &[String], registered: &[&str]) -> (Vec<String>, Vec<String>) {
    let unregistered = generative
        .iter()
        .filter(|name| !registered.contains(&name.as_str()))
        .cloned()
        .collect();
    let unmonitored = registered
        .iter()
        .filter(|name| !generative.iter().any(|g| g == *name))
        .map(|name| name.to_string())
        .collect();
    (unregistered, unmonitored)
}

impl Default for ResilientGatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
