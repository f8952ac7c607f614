//! Error taxonomy for protected calls.

use std::time::Duration;
use thiserror::Error;

/// Boxed cause of a failed operation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from a single breaker-protected call.
#[derive(Error, Debug)]
pub enum CircuitError {
    /// The call was rejected without invoking the operation.
    #[error("Circuit '{provider}' is open, retry after {retry_after:?}")]
    Open {
        provider: String,
        retry_after: Duration,
    },

    /// The operation did not finish within its deadline.
    #[error("Circuit '{provider}' call timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    /// The operation completed but failed.
    #[error("Circuit '{provider}' call failed: {source}")]
    Failure {
        provider: String,
        #[source]
        source: BoxError,
    },
}

impl CircuitError {
    /// Provider whose breaker produced the error.
    pub fn provider(&self) -> &str {
        match self {
            CircuitError::Open { provider, .. }
            | CircuitError::Timeout { provider, .. }
            | CircuitError::Failure { provider, .. } => provider,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CircuitError::Timeout { .. })
    }

    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CircuitError::Open { .. } => "open",
            CircuitError::Timeout { .. } => "timeout",
            CircuitError::Failure { .. } => "failure",
        }
    }
}

/// Errors from ordered multi-provider fallback.
#[derive(Error, Debug)]
pub enum FallbackError {
    /// Every provider in the list failed.
    #[error("No providers available (tried {:?}){}", .attempted, .last.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
    NoProvidersAvailable {
        attempted: Vec<String>,
        #[source]
        last: Option<Box<CircuitError>>,
    },
}

impl FallbackError {
    /// The error from the last provider attempted.
    pub fn last_error(&self) -> Option<&CircuitError> {
        match self {
            FallbackError::NoProvidersAvailable { last, .. } => last.as_deref(),
        }
    }

    /// Providers attempted, in order.
    pub fn attempted(&self) -> &[String] {
        match self {
            FallbackError::NoProvidersAvailable { attempted, .. } => attempted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_failure_keeps_source() {
        let err = CircuitError::Failure {
            provider: "openai".to_string(),
            source: "connection reset".into(),
        };

        assert_eq!(err.kind(), "failure");
        assert_eq!(err.source().unwrap().to_string(), "connection reset");
        assert_eq!(err.to_string(), "Circuit 'openai' call failed: connection reset");
    }

    #[test]
    fn test_no_providers_message_includes_last_cause() {
        let err = FallbackError::NoProvidersAvailable {
            attempted: vec!["a".to_string(), "b".to_string()],
            last: Some(Box::new(CircuitError::Timeout {
                provider: "b".to_string(),
                timeout: Duration::from_millis(500),
            })),
        };

        assert!(err.to_string().contains("tried [\"a\", \"b\"]"));
        assert!(err.to_string().contains("Circuit 'b' call timed out"));
        assert_eq!(err.last_error().unwrap().provider(), "b");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_no_providers_without_cause() {
        let err = FallbackError::NoProvidersAvailable {
            attempted: vec![],
            last: None,
        };
        assert_eq!(err.to_string(), "No providers available (tried [])");
        assert!(err.source().is_none());
    }
}
