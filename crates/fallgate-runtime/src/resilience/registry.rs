//! Named circuit breakers and ordered provider fallback.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use fallgate_core::{CircuitBreakerConfig, ConfigError, GatewayConfig, TraceId};

use super::circuit_breaker::{BreakerStatus, CircuitBreaker};
use super::error::{BoxError, FallbackError};
use crate::events::{EventSink, TracingEventSink};

/// Owns one breaker per provider name.
///
/// Breakers are created lazily on first use. Once created a breaker is
/// shared by `Arc` and never replaced, so the map lock is only taken for
/// writing when a new name shows up.
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    provider_configs: BTreeMap<String, CircuitBreakerConfig>,
    breakers: RwLock<BTreeMap<String, Arc<CircuitBreaker>>>,
    events: Arc<dyn EventSink>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self {
            default_config: CircuitBreakerConfig::default(),
            provider_configs: BTreeMap::new(),
            breakers: RwLock::new(BTreeMap::new()),
            events: Arc::new(TracingEventSink),
        }
    }
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers all start from `default_config`.
    pub fn new(
        default_config: CircuitBreakerConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        default_config.validate()?;
        Ok(Self {
            default_config,
            provider_configs: BTreeMap::new(),
            breakers: RwLock::new(BTreeMap::new()),
            events,
        })
    }

    /// Create a registry using the breaker defaults and per-provider
    /// overrides of a gateway config.
    pub fn from_config(config: &GatewayConfig, events: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            default_config: config.default_breaker(),
            provider_configs: config.provider_breakers(),
            breakers: RwLock::new(BTreeMap::new()),
            events,
        })
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Config a new breaker for `provider` would be created with.
    pub fn config_for(&self, provider: &str) -> &CircuitBreakerConfig {
        self.provider_configs
            .get(provider)
            .unwrap_or(&self.default_config)
    }

    /// Existing breaker for `provider`, without creating one.
    pub fn get(&self, provider: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(provider).cloned()
    }

    /// Existing breaker for `provider`, or a new one.
    ///
    /// `config` only applies when the breaker does not exist yet; otherwise
    /// the registry's configured settings for that name are used. Concurrent
    /// first use yields a single breaker.
    pub fn get_or_create(
        &self,
        provider: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(config) = &config {
            config.validate().map_err(|e| e.for_provider(provider))?;
        }
        Ok(self.get_or_insert(provider, config))
    }

    /// Breaker for `provider` using the registry's configured settings.
    pub fn breaker(&self, provider: &str) -> Arc<CircuitBreaker> {
        self.get_or_insert(provider, None)
    }

    fn get_or_insert(&self, provider: &str, config: Option<CircuitBreakerConfig>) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(provider) {
            return existing;
        }

        let mut breakers = self.breakers.write();
        // Another caller may have created it between the two locks
        if let Some(existing) = breakers.get(provider) {
            return existing.clone();
        }

        let config = config.unwrap_or_else(|| self.config_for(provider).clone());
        tracing::debug!(provider, failure_threshold = config.failure_threshold, "Creating circuit breaker");

        let breaker = Arc::new(CircuitBreaker::from_validated(
            provider.to_string(),
            config,
            self.events.clone(),
        ));
        breakers.insert(provider.to_string(), breaker.clone());
        breaker
    }

    /// Try `providers` strictly in order until one succeeds.
    ///
    /// Returns the result and the name of the provider that produced it.
    pub async fn call_with_fallback<T, E, F, Fut>(
        &self,
        providers: &[&str],
        operation: F,
    ) -> Result<(T, String), FallbackError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        self.call_with_fallback_traced(None, providers, operation).await
    }

    /// Like [`call_with_fallback`](Self::call_with_fallback), stamping
    /// breaker events with a trace id.
    pub async fn call_with_fallback_traced<T, E, F, Fut>(
        &self,
        trace_id: Option<&TraceId>,
        providers: &[&str],
        mut operation: F,
    ) -> Result<(T, String), FallbackError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let mut attempted = Vec::with_capacity(providers.len());
        let mut last = None;

        for &provider in providers {
            attempted.push(provider.to_string());
            let breaker = self.breaker(provider);

            match breaker
                .call_traced(trace_id, || operation(provider.to_string()))
                .await
            {
                Ok(value) => {
                    if attempted.len() > 1 {
                        tracing::info!(
                            provider,
                            skipped = attempted.len() - 1,
                            "Fallback provider succeeded"
                        );
                    }
                    return Ok((value, provider.to_string()));
                }
                Err(e) => {
                    tracing::debug!(provider, kind = e.kind(), error = %e, "Provider failed, trying next");
                    last = Some(Box::new(e));
                }
            }
        }

        Err(FallbackError::NoProvidersAvailable { attempted, last })
    }

    /// Status of every known breaker. No side effects.
    pub fn status_snapshot(&self) -> BTreeMap<String, BreakerStatus> {
        // Clone the Arcs first so breaker locks are never taken under the map lock
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        breakers
            .into_iter()
            .map(|b| (b.name().to_string(), b.status()))
            .collect()
    }

    /// Names of every known breaker, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        self.breakers.read().keys().cloned().collect()
    }

    /// Reset one breaker. Returns false if no breaker has that name.
    pub fn reset(&self, provider: &str) -> bool {
        match self.get(provider) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }
}
