//! Test utilities for mindloop - scripted backends and fixtures
//!
//! Used by unit tests and the integration tests under `tests/` to exercise
//! the engines without HTTP servers or real model output.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::actions::ActionContext;
use crate::channel::{ChannelError, Notifier, OutboundMessage};
use crate::config::{Config, MemoryConfig, RetryConfig};
use crate::memory::{MemoryEngine, MemoryError};
use crate::provider::{
    Backend, Completion, GenerateOptions, LlmProvider, ProviderError, RetryPolicy,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Backend that replays queued outcomes in order
///
/// When the queue is empty it answers with the default text if one is set,
/// otherwise with a non-retryable malformed-response error.
#[derive(Debug)]
pub struct ScriptedBackend {
    name: String,
    outcomes: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_text: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
    reachable: Mutex<bool>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcomes: Mutex::new(VecDeque::new()),
            default_text: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            reachable: Mutex::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        lock(&self.outcomes).push_back(Ok(text.into()));
    }

    pub fn push_error(&self, error: ProviderError) {
        lock(&self.outcomes).push_back(Err(error));
    }

    /// Answer used once the queue runs dry
    pub fn set_default_text(&self, text: impl Into<String>) {
        *lock(&self.default_text) = Some(text.into());
    }

    pub fn set_reachable(&self, reachable: bool) {
        *lock(&self.reachable) = reachable;
    }

    /// Number of generate calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in order
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.to_string());

        let next = lock(&self.outcomes).pop_front();
        let outcome = match next {
            Some(outcome) => outcome,
            None => lock(&self.default_text)
                .clone()
                .ok_or_else(|| ProviderError::Malformed("no scripted response left".to_string())),
        };
        outcome.map(|text| Completion {
            text,
            model: "scripted".to_string(),
            usage: None,
        })
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        if *lock(&self.reachable) {
            Ok(())
        } else {
            Err(ProviderError::Connection("scripted backend unreachable".to_string()))
        }
    }
}

/// Notifier that keeps every message it is given
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        lock(&self.messages).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        lock(&self.messages).push(message);
        Ok(())
    }
}

/// Provider with a single scripted backend, no retries and no backoff
pub fn scripted_provider(responses: Vec<&str>) -> (LlmProvider, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::new("scripted"));
    for response in responses {
        backend.push_text(response);
    }
    let provider = LlmProvider::new(RetryPolicy::immediate()).with_backend(backend.clone(), 0);
    (provider, backend)
}

/// Memory config storing under `dir`
pub fn memory_config(dir: &Path) -> MemoryConfig {
    MemoryConfig {
        path: dir.join("memories.json"),
        ..MemoryConfig::default()
    }
}

/// Full config with every file under `dir` and no waiting between cycles
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config {
        memory: memory_config(dir),
        retry: RetryConfig {
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        },
        ..Config::default()
    };
    config.agent.state_path = dir.join("agent_state.json");
    config.agent.loop_interval_ms = 0;
    config.agent.error_backoff_ms = 10;
    config
}

/// Action context over a fresh store in `dir`
pub async fn action_context(
    dir: &Path,
) -> Result<(ActionContext, Arc<RecordingNotifier>), MemoryError> {
    let config = test_config(dir);
    let memory = MemoryEngine::open(&config.memory).await?;
    let (provider, _) = scripted_provider(vec![]);
    let notifier = Arc::new(RecordingNotifier::new());

    let ctx = ActionContext {
        config: Arc::new(config),
        memory: Arc::new(memory),
        provider: Arc::new(provider),
        notifier: notifier.clone(),
        goal: None,
        cycle: 1,
    };
    Ok((ctx, notifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_backend_replays_in_order() {
        let backend = ScriptedBackend::new("s");
        backend.push_text("one");
        backend.push_error(ProviderError::Timeout("late".into()));

        let options = GenerateOptions::default();
        assert_eq!(backend.generate("a", &options).await.unwrap().text, "one");
        assert!(backend.generate("b", &options).await.is_err());
        assert!(matches!(
            backend.generate("c", &options).await,
            Err(ProviderError::Malformed(_))
        ));

        backend.set_default_text("again");
        assert_eq!(backend.generate("d", &options).await.unwrap().text, "again");
        assert_eq!(backend.calls(), 4);
        assert_eq!(backend.prompts(), vec!["a", "b", "c", "d"]);
    }
}
