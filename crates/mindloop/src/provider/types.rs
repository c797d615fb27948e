//! Provider request, response and error types

use serde::Serialize;
use std::time::Duration;

/// Per-request generation options; unset fields fall back to backend defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// System instruction for backends that support one
    pub system: Option<String>,
}

/// Token accounting reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A single backend's answer
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Result of [`LlmProvider::generate`](crate::provider::LlmProvider::generate)
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub model: String,
    /// Name of the backend that served the response
    pub backend: String,
    /// Position of that backend in the failover order
    pub backend_index: usize,
    /// Attempts made across all backends, including the successful one
    pub attempts: u32,
    pub usage: Option<TokenUsage>,
}

/// Outcome of a connectivity probe
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub backend: String,
    pub model: String,
    pub reachable: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Why a backend was given up on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendFailure {
    pub backend: String,
    pub attempts: u32,
    pub error: String,
}

fn describe_failures(failures: &[BackendFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({} attempts): {}", f.backend, f.attempts, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Provider errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    /// Rate limited or server-side failure (429, 5xx)
    #[error("backend unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    /// Any other non-success status
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("provider configuration error: {0}")]
    Config(String),

    #[error("all {} providers exhausted: {}", .failures.len(), describe_failures(.failures))]
    AllProvidersExhausted { failures: Vec<BackendFailure> },
}

impl ProviderError {
    /// Whether the same backend should be tried again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::Connection(_)
                | ProviderError::Unavailable { .. }
        )
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || (500..600).contains(&status) {
            ProviderError::Unavailable { status, message }
        } else {
            ProviderError::Rejected { status, message }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::from_status(status.as_u16(), e.to_string())
        } else {
            ProviderError::Connection(e.to_string())
        }
    }
}

/// Exponential backoff bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&crate::config::RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &crate::config::RetryConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// No waiting between attempts
    pub fn immediate() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped at `max`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2_u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}
