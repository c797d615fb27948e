//! Ollama backend (`POST /api/generate`, probe `GET /api/tags`)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{base_url, check_status, http_client, non_empty};
use crate::config::BackendConfig;
use crate::provider::backend::Backend;
use crate::provider::types::{Completion, GenerateOptions, ProviderError, TokenUsage};

#[derive(Debug)]
pub struct OllamaBackend {
    client: Client,
    name: String,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    options: SamplingOptions,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config)?,
            name: config.display_name(),
            base_url: base_url(config),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Backend for OllamaBackend {
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
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            system: options.system.as_deref(),
            options: SamplingOptions {
                temperature: options.temperature.unwrap_or(self.temperature),
                num_predict: options.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.base_url);
        debug!(backend = %self.name, "POST {}", url);
        let response = self.client.post(&url).json(&request).send().await?;
        let body: GenerateResponse = check_status(response).await?.json().await?;

        let usage = match (body.prompt_eval_count, body.eval_count) {
            (Some(prompt_tokens), Some(completion_tokens)) => Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
            }),
            _ => None,
        };
        Ok(Completion {
            text: non_empty(body.response)?,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            usage,
        })
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;
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
            kind: BackendKind::Ollama,
            name: Some("local".to_string()),
            endpoint,
            model: "llama3".to_string(),
            timeout_secs: 5,
            max_retries: 0,
            api_key_env: None,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_generate_sends_num_predict() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3",
                "stream": false,
                "options": { "num_predict": 64 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3",
                "response": "hello there",
                "prompt_eval_count": 12,
                "eval_count": 3
            })))
            .mount(&mock_server)
            .await;

        let backend = OllamaBackend::new(&create_test_config(mock_server.uri())).unwrap();
        let options = GenerateOptions {
            max_tokens: Some(64),
            ..Default::default()
        };
        let completion = backend.generate("hi", &options).await.unwrap();

        assert_eq!(completion.text, "hello there");
        assert_eq!(
            completion.usage,
            Some(TokenUsage {
                prompt_tokens: 12,
                completion_tokens: 3
            })
        );
    }

    #[tokio::test]
    async fn test_missing_response_field_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "done": true })),
            )
            .mount(&mock_server)
            .await;

        let backend = OllamaBackend::new(&create_test_config(mock_server.uri())).unwrap();
        let err = backend
            .generate("hi", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_probe_hits_tags_endpoint() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "models": [] })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = OllamaBackend::new(&create_test_config(mock_server.uri())).unwrap();
        assert!(backend.test_connection().await.is_ok());
    }
}
