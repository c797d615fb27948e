//! OpenAI-compatible chat backend
//!
//! `POST {endpoint}/chat/completions` with a bearer key read from the
//! environment variable named in the backend config. Probe: `GET {endpoint}/models`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{base_url, check_status, http_client, non_empty, resolve_api_key};
use crate::config::BackendConfig;
use crate::provider::backend::Backend;
use crate::provider::types::{Completion, GenerateOptions, ProviderError, TokenUsage};

#[derive(Debug)]
pub struct OpenAiBackend {
    client: Client,
    name: String,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl Usage {
    pub(super) fn into_token_usage(self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
        }
    }
}

impl OpenAiBackend {
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
impl Backend for OpenAiBackend {
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
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system.as_deref() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: prompt,
        });

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: options.temperature.unwrap_or(self.temperature),
            max_tokens: options.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(backend = %self.name, "POST {}", url);
        let response = self
            .authorize(self.client.post(&url))
            .json(&request)
            .send()
            .await?;
        let body: ChatCompletionResponse = check_status(response).await?.json().await?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("response has no choices".to_string()))?;

        Ok(Completion {
            text: non_empty(text)?,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            usage: body.usage.map(Usage::into_token_usage),
        })
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use std::env;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(endpoint: String, api_key_env: Option<&str>) -> BackendConfig {
        BackendConfig {
            kind: BackendKind::OpenAi,
            name: None,
            endpoint,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 5,
            max_retries: 0,
            api_key_env: api_key_env.map(str::to_string),
            temperature: 0.2,
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_env_is_config_error() {
        unsafe { env::remove_var("MINDLOOP_TEST_MISSING_KEY") };

        let config = create_test_config(
            "https://api.example.com/v1".to_string(),
            Some("MINDLOOP_TEST_MISSING_KEY"),
        );
        let err = OpenAiBackend::new(&config).unwrap_err();
        assert!(err.to_string().contains("MINDLOOP_TEST_MISSING_KEY"));
    }

    #[tokio::test]
    async fn test_generate_with_bearer_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini-2024",
                "choices": [{ "message": { "content": "pong" } }],
                "usage": { "prompt_tokens": 4, "completion_tokens": 1 }
            })))
            .mount(&mock_server)
            .await;

        unsafe { env::set_var("MINDLOOP_TEST_OPENAI_KEY", "test-key") };
        let config = create_test_config(mock_server.uri(), Some("MINDLOOP_TEST_OPENAI_KEY"));
        let backend = OpenAiBackend::new(&config).unwrap();

        let completion = backend
            .generate("ping", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.text, "pong");
        assert_eq!(completion.model, "gpt-4o-mini-2024");
        assert_eq!(completion.usage.map(|u| u.completion_tokens), Some(1));
    }

    #[tokio::test]
    async fn test_empty_choices_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&mock_server)
            .await;

        let backend = OpenAiBackend::new(&create_test_config(mock_server.uri(), None)).unwrap();
        let err = backend
            .generate("ping", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&mock_server)
            .await;

        let backend = OpenAiBackend::new(&create_test_config(mock_server.uri(), None)).unwrap();
        let err = backend
            .generate("ping", &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { status: 429, .. }));
        assert!(err.is_retryable());
    }
}
