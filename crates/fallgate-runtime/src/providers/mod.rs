//! Generative provider abstraction for fallgate-runtime.
//!
//! Provider clients live outside this crate. They implement
//! [`GenerativeProvider`] and the gateway wraps every call in that
//! provider's circuit breaker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fallgate_core::{SourceRecord, TraceId};

/// Errors reported by a generative provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// What the gateway asks a provider to answer.
///
/// Turning the query and sources into a prompt is up to the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub query: String,
    pub sources: Vec<SourceRecord>,
    pub trace_id: TraceId,
}

impl CompletionRequest {
    pub fn new(query: &str, sources: &[SourceRecord], trace_id: &TraceId) -> Self {
        Self {
            query: query.to_string(),
            sources: sources.to_vec(),
            trace_id: trace_id.clone(),
        }
    }
}

/// Response from a completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,

    /// Model that produced the answer
    pub model: String,

    #[serde(default)]
    pub usage: TokenUsage,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A generative backend.
///
/// `name()` is also the circuit breaker key, so it must be stable.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    fn name(&self) -> &str;
}
