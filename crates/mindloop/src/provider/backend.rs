//! Backend capability trait
//!
//! Every model server kind implements [`Backend`]. The failover chain holds an
//! ordered list of trait objects and never needs to know which kind it is
//! talking to.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{BackendConfig, BackendKind};
use crate::provider::backends::{CompletionsBackend, OllamaBackend, OpenAiBackend};
use crate::provider::types::{Completion, GenerateOptions, ProviderError};

/// Trait for language-model backends (Ollama, OpenAI-compatible, text completions)
#[async_trait]
pub trait Backend: Send + Sync {
    /// Display name for logs and reports
    fn name(&self) -> &str;

    /// Model identifier requested from the backend
    fn model(&self) -> &str;

    /// Send one generate request
    ///
    /// Implementations make exactly one HTTP round trip; retries belong to the chain.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Completion, ProviderError>;

    /// Minimal round trip against the backend's probe endpoint
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// Build the backend variant matching `config.kind`
pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn Backend>, ProviderError> {
    let backend: Arc<dyn Backend> = match config.kind {
        BackendKind::Ollama => Arc::new(OllamaBackend::new(config)?),
        BackendKind::OpenAi => Arc::new(OpenAiBackend::new(config)?),
        BackendKind::LmStudio | BackendKind::Oobabooga => {
            Arc::new(CompletionsBackend::new(config)?)
        }
    };
    Ok(backend)
}
