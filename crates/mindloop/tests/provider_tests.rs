//! Integration tests for the provider failover chain
//!
//! Each backend runs against its own mock HTTP server so the tests can count
//! exactly how many requests every backend received.

use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mindloop::config::{BackendConfig, BackendKind, Config, RetryConfig};
use mindloop::provider::{GenerateOptions, LlmProvider, ProviderError};

fn backend(kind: BackendKind, name: &str, endpoint: String, max_retries: u32) -> BackendConfig {
    BackendConfig {
        kind,
        name: Some(name.to_string()),
        endpoint,
        model: "test-model".to_string(),
        timeout_secs: 5,
        max_retries,
        api_key_env: None,
        temperature: 0.7,
    }
}

fn config_with(providers: Vec<BackendConfig>) -> Config {
    Config {
        providers,
        retry: RetryConfig {
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        },
        ..Config::default()
    }
}

async fn ollama_answering(status: u16, body: serde_json::Value, expected: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(expected)
        .mount(&server)
        .await;
    server
}

// =============================================================================
// Failover
// =============================================================================

#[tokio::test]
async fn test_failover_reaches_third_backend_in_order() {
    // Retryable: 1 + 1 retry = 2 requests, then fail over
    let first = ollama_answering(503, json!({"error": "loading model"}), 2).await;
    // Not retryable: exactly one request
    let second = ollama_answering(400, json!({"error": "bad request"}), 1).await;
    let third = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model",
            "choices": [{"message": {"role": "assistant", "content": "hello from the third"}}]
        })))
        .expect(1)
        .mount(&third)
        .await;

    let config = config_with(vec![
        backend(BackendKind::Ollama, "first", first.uri(), 1),
        backend(BackendKind::Ollama, "second", second.uri(), 3),
        backend(BackendKind::OpenAi, "third", third.uri(), 0),
    ]);
    let provider = LlmProvider::from_config(&config).unwrap();
    assert_eq!(provider.backend_names(), vec!["first", "second", "third"]);

    let generation = provider
        .generate("Say hello", &GenerateOptions::default())
        .await
        .unwrap();

    assert_eq!(generation.text, "hello from the third");
    assert_eq!(generation.backend, "third");
    assert_eq!(generation.backend_index, 2);
    assert_eq!(generation.attempts, 4);
}

#[tokio::test]
async fn test_exhaustion_reports_every_backend() {
    let first = ollama_answering(500, json!({"error": "boom"}), 3).await;
    let second = ollama_answering(401, json!({"error": "no key"}), 1).await;

    let config = config_with(vec![
        backend(BackendKind::Ollama, "first", first.uri(), 2),
        backend(BackendKind::Ollama, "second", second.uri(), 2),
    ]);
    let provider = LlmProvider::from_config(&config).unwrap();

    let err = provider
        .generate("anything", &GenerateOptions::default())
        .await
        .unwrap_err();

    let ProviderError::AllProvidersExhausted { failures } = &err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].backend, "first");
    assert_eq!(failures[0].attempts, 3);
    assert_eq!(failures[1].backend, "second");
    assert_eq!(failures[1].attempts, 1);
    assert!(err.to_string().starts_with("all 2 providers exhausted"));
}

#[tokio::test]
async fn test_rate_limit_is_retried_on_same_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "finally",
            "model": "test-model"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_with(vec![backend(BackendKind::Ollama, "only", server.uri(), 3)]);
    let provider = LlmProvider::from_config(&config).unwrap();

    let generation = provider
        .generate("again", &GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(generation.text, "finally");
    assert_eq!(generation.backend_index, 0);
    assert_eq!(generation.attempts, 2);
}

#[tokio::test]
async fn test_empty_completion_fails_over() {
    let first = ollama_answering(200, json!({"response": "   "}), 1).await;
    let second = ollama_answering(200, json!({"response": "something"}), 1).await;

    let config = config_with(vec![
        backend(BackendKind::Ollama, "first", first.uri(), 3),
        backend(BackendKind::Ollama, "second", second.uri(), 3),
    ]);
    let provider = LlmProvider::from_config(&config).unwrap();

    let generation = provider
        .generate("x", &GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(generation.backend, "second");
}

/// Server that sends response headers and then stalls mid-body
async fn stalling_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0_u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"response\":";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    (format!("http://{addr}"), connections)
}

#[tokio::test]
async fn test_body_timeout_is_retried_on_same_backend() {
    let (endpoint, connections) = stalling_server().await;
    let mut slow = backend(BackendKind::Ollama, "slow", endpoint, 1);
    slow.timeout_secs = 1;
    let provider = LlmProvider::from_config(&config_with(vec![slow])).unwrap();

    let err = provider
        .generate("hello", &GenerateOptions::default())
        .await
        .unwrap_err();

    let ProviderError::AllProvidersExhausted { failures } = &err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert_eq!(failures[0].attempts, 2);
    assert!(failures[0].error.starts_with("request timed out"));
    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_undecodable_body_fails_over_without_retry() {
    let first = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .expect(1)
        .mount(&first)
        .await;
    let second = ollama_answering(200, json!({"response": "fine"}), 1).await;

    let config = config_with(vec![
        backend(BackendKind::Ollama, "first", first.uri(), 3),
        backend(BackendKind::Ollama, "second", second.uri(), 3),
    ]);
    let provider = LlmProvider::from_config(&config).unwrap();

    let generation = provider
        .generate("x", &GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(generation.backend, "second");
    assert_eq!(generation.attempts, 2);
}

#[tokio::test]
async fn test_text_completions_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "local",
            "choices": [{"text": " observe the room"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_with(vec![backend(BackendKind::LmStudio, "studio", server.uri(), 0)]);
    let provider = LlmProvider::from_config(&config).unwrap();

    let generation = provider
        .generate("next?", &GenerateOptions::default())
        .await
        .unwrap();
    assert!(generation.text.contains("observe the room"));
}

// =============================================================================
// Connectivity probe
// =============================================================================

#[tokio::test]
async fn test_probe_only_touches_first_backend() {
    let first = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .expect(1)
        .mount(&first)
        .await;
    let second = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&second)
        .await;

    let config = config_with(vec![
        backend(BackendKind::Ollama, "first", first.uri(), 3),
        backend(BackendKind::Ollama, "second", second.uri(), 3),
    ]);
    let provider = LlmProvider::from_config(&config).unwrap();

    let report = provider.test_connection().await;
    assert!(report.reachable);
    assert_eq!(report.backend, "first");
    assert_eq!(report.model, "test-model");
    assert!(report.error.is_none());
}

#[tokio::test]
async fn test_probe_failure_is_reported_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_with(vec![backend(BackendKind::Ollama, "down", server.uri(), 5)]);
    let provider = LlmProvider::from_config(&config).unwrap();

    let report = provider.test_connection().await;
    assert!(!report.reachable);
    assert!(report.error.is_some());
}
