//! Retry and failover across the ordered backend list
//!
//! Backends are tried strictly one after another. Each gets `1 + max_retries`
//! attempts; only timeouts, connection failures and 429/5xx responses are
//! retried, with a capped exponential delay in between. Anything else moves
//! straight on to the next backend.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::provider::backend::{Backend, build_backend};
use crate::provider::types::{
    BackendFailure, ConnectionReport, GenerateOptions, Generation, ProviderError, RetryPolicy,
};

struct Slot {
    backend: Arc<dyn Backend>,
    max_retries: u32,
}

/// Uniform generate interface over one or more backends
pub struct LlmProvider {
    slots: Vec<Slot>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProvider")
            .field("backends", &self.backend_names())
            .field("retry", &self.retry)
            .finish()
    }
}

impl LlmProvider {
    /// Empty chain; add backends with [`with_backend`](Self::with_backend)
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            slots: Vec::new(),
            retry,
        }
    }

    /// Build every configured backend in failover order
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let mut provider = Self::new(RetryPolicy::from_config(&config.retry));
        for backend_config in &config.providers {
            let backend = build_backend(backend_config)?;
            provider = provider.with_backend(backend, backend_config.max_retries);
        }
        if provider.is_empty() {
            return Err(ProviderError::Config("no backends configured".to_string()));
        }
        info!(
            "LLM provider initialized with backends: {}",
            provider.backend_names().join(", ")
        );
        Ok(provider)
    }

    /// Append a backend to the failover order
    pub fn with_backend(mut self, backend: Arc<dyn Backend>, max_retries: u32) -> Self {
        self.slots.push(Slot {
            backend,
            max_retries,
        });
        self
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|s| s.backend.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Generate with retry and failover
    ///
    /// Fails with [`ProviderError::AllProvidersExhausted`] only after every
    /// backend has used up its attempts.
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        if self.slots.is_empty() {
            return Err(ProviderError::Config("no backends configured".to_string()));
        }

        let mut failures = Vec::new();
        let mut total_attempts = 0;

        for (index, slot) in self.slots.iter().enumerate() {
            let name = slot.backend.name();
            let mut attempts = 0;

            let error = loop {
                attempts += 1;
                total_attempts += 1;
                debug!(backend = %name, attempt = attempts, "Sending generate request");

                match slot.backend.generate(prompt, options).await {
                    Ok(completion) => {
                        if index > 0 {
                            info!(backend = %name, index, "Served by fallback backend");
                        }
                        return Ok(Generation {
                            text: completion.text,
                            model: completion.model,
                            backend: name.to_string(),
                            backend_index: index,
                            attempts: total_attempts,
                            usage: completion.usage,
                        });
                    }
                    Err(e) if e.is_retryable() && attempts <= slot.max_retries => {
                        let delay = self.retry.delay_for(attempts - 1);
                        warn!(
                            backend = %name,
                            attempt = attempts,
                            "Request failed, retrying in {:?}: {}",
                            delay,
                            e
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => break e,
                }
            };

            warn!(
                backend = %name,
                attempts,
                "Backend failed, moving to next: {}",
                error
            );
            failures.push(BackendFailure {
                backend: name.to_string(),
                attempts,
                error: error.to_string(),
            });
        }

        Err(ProviderError::AllProvidersExhausted { failures })
    }

    /// Single probe against the first backend
    ///
    /// Runs outside the retry and failover path.
    pub async fn test_connection(&self) -> ConnectionReport {
        let Some(slot) = self.slots.first() else {
            return ConnectionReport {
                backend: String::new(),
                model: String::new(),
                reachable: false,
                latency_ms: 0,
                error: Some("no backends configured".to_string()),
            };
        };

        let started = Instant::now();
        let result = slot.backend.test_connection().await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        ConnectionReport {
            backend: slot.backend.name().to_string(),
            model: slot.backend.model().to_string(),
            reachable: result.is_ok(),
            latency_ms,
            error: result.err().map(|e| e.to_string()),
        }
    }
}
