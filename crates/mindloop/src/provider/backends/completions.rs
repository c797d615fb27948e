//! Plain text-completions backend used by LM Studio and oobabooga
//!
//! `POST {endpoint}/v1/completions`, probe `GET {endpoint}/v1/models`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::openai::Usage;
use super::{base_url, check_status, http_client, non_empty, resolve_api_key};
use crate::config::BackendConfig;
use crate::provider::backend::Backend;
use crate::provider::types::{Completion, GenerateOptions, ProviderError};

/// Tokens requested when the caller sets no limit
const DEFAULT_MAX_TOKENS: u32 = 1000;

#[derive(Debug)]
pub struct CompletionsBackend {
    client: Client,
    name: String,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    text: String,
}

impl CompletionsBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config)?,
            name: config.display_name(),
            base_url: base_url(config),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: resolve_api_key(config)?,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl Backend for CompletionsBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Completion, ProviderError> {
        // No system role on this endpoint, so it is prepended to the prompt
        let prompt = match options.system.as_deref() {
            Some(system) => format!("{system}\n\n{prompt}"),
            None => prompt.to_string(),
        };
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature.unwrap_or(self.temperature),
            stream: false,
        };

        let url = format!("{}/v1/completions", self.base_url);
        debug!(backend = %self.name, "POST {}", url);
        let response = self
            .authorize(self.client.post(&url))
            .json(&request)
            .send()
            .await?;
        let body: CompletionResponse = check_status(response).await?.json().await?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| ProviderError::Malformed("response has no choices".to_string()))?;

        Ok(Completion {
            text: non_empty(text)?,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            usage: body.usage.map(Usage::into_token_usage),
        })
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(endpoint: String) -> BackendConfig {
        BackendConfig {
            kind: BackendKind::LmStudio,
            name: Some("studio".to_string()),
            endpoint,
            model: "local-model".to_string(),
            timeout_secs: 5,
            max_retries: 0,
            api_key_env: None,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_system_is_prepended_to_prompt() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "Be brief.\n\nSay hi",
                "max_tokens": 1000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "text": " hi" }]
            })))
            .mount(&mock_server)
            .await;

        let backend = CompletionsBackend::new(&create_test_config(mock_server.uri())).unwrap();
        let options = GenerateOptions {
            system: Some("Be brief.".to_string()),
            ..Default::default()
        };
        let completion = backend.generate("Say hi", &options).await.unwrap();
        assert_eq!(completion.text, " hi");
        assert_eq!(completion.model, "local-model");
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock_server)
            .await;

        let backend = CompletionsBackend::new(&create_test_config(mock_server.uri())).unwrap();
        let err = backend
            .generate("x", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_probe_reports_rejection() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let backend = CompletionsBackend::new(&create_test_config(mock_server.uri())).unwrap();
        assert!(matches!(
            backend.test_connection().await,
            Err(ProviderError::Rejected { status: 404, .. })
        ));
    }
}
