//! HTTP backend implementations

mod completions;
mod ollama;
mod openai;

pub use completions::CompletionsBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use reqwest::{Client, Response};
use std::env;
use std::time::Duration;

use crate::config::BackendConfig;
use crate::provider::types::ProviderError;

/// HTTP client with the backend's request timeout
fn http_client(config: &BackendConfig) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| ProviderError::Config(e.to_string()))
}

/// Read the API key named by `api_key_env`, if one is configured
fn resolve_api_key(config: &BackendConfig) -> Result<Option<String>, ProviderError> {
    match &config.api_key_env {
        Some(var) => env::var(var).map(Some).map_err(|_| {
            ProviderError::Config(format!(
                "API key env var '{}' not set for backend '{}'",
                var,
                config.display_name()
            ))
        }),
        None => Ok(None),
    }
}

fn base_url(config: &BackendConfig) -> String {
    config.endpoint.trim_end_matches('/').to_string()
}

/// Turn a non-success response into a classified error
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ProviderError::from_status(status.as_u16(), body))
}

/// Reject completions with no usable text
fn non_empty(text: String) -> Result<String, ProviderError> {
    if text.trim().is_empty() {
        Err(ProviderError::Malformed("empty completion".to_string()))
    } else {
        Ok(text)
    }
}
