//! Action handler capability, execution context and results

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::channel::Notifier;
use crate::config::Config;
use crate::memory::MemoryEngine;
use crate::provider::LlmProvider;

/// Parameters handed to a handler
pub type Params = Map<String, Value>;

/// Action errors; every variant ends up inside a failed [`ActionResult`]
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum ActionError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid parameters for '{action}': {reason}")]
    InvalidParams { action: String, reason: String },

    #[error("action '{0}' is already registered")]
    Duplicate(String),

    #[error("action '{action}' timed out after {timeout_ms} ms")]
    Timeout { action: String, timeout_ms: u64 },

    #[error("action failed: {0}")]
    Failed(String),

    #[error("action '{0}' panicked")]
    Panicked(String),
}

/// Outcome of one `execute` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub output: Value,
    pub error: Option<ActionError>,
    pub duration_ms: u64,
}

impl ActionResult {
    pub fn ok(output: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(error: ActionError, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error),
            duration_ms,
        }
    }

    /// Fact a handler asked to be remembered (`output.learned_fact`)
    pub fn learned_fact(&self) -> Option<&str> {
        self.output
            .get("learned_fact")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// One-line description used for memory entries and notifications
    pub fn summary(&self) -> String {
        match &self.error {
            Some(error) => error.to_string(),
            None => match &self.output {
                Value::Null => "completed".to_string(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        }
    }
}

/// Shared handles every handler receives
///
/// Built once by the orchestrator and cloned per execution; all fields are
/// cheap reference-counted handles or small values.
#[derive(Clone)]
pub struct ActionContext {
    pub config: Arc<Config>,
    pub memory: Arc<MemoryEngine>,
    pub provider: Arc<LlmProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub goal: Option<String>,
    pub cycle: u64,
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("goal", &self.goal)
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

/// Trait for action handlers
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Short description shown to the model
    fn description(&self) -> &str {
        ""
    }

    /// Run the action; parameters were already validated against the schema
    async fn call(&self, params: Params, ctx: ActionContext) -> Result<Value, ActionError>;
}

type HandlerFn = dyn Fn(Params, ActionContext) -> BoxFuture<'static, Result<Value, ActionError>>
    + Send
    + Sync;

/// Handler backed by a closure returning a boxed future
pub struct FnHandler {
    description: String,
    f: Box<HandlerFn>,
}

impl FnHandler {
    pub fn new<F>(description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Params, ActionContext) -> BoxFuture<'static, Result<Value, ActionError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            description: description.into(),
            f: Box::new(f),
        }
    }
}

#[async_trait]
impl ActionHandler for FnHandler {
    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, params: Params, ctx: ActionContext) -> Result<Value, ActionError> {
        (self.f)(params, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_learned_fact_extraction() {
        let result = ActionResult::ok(json!({"learned_fact": "water boils at 100C"}), 1);
        assert_eq!(result.learned_fact(), Some("water boils at 100C"));

        let blank = ActionResult::ok(json!({"learned_fact": "  "}), 1);
        assert_eq!(blank.learned_fact(), None);
        assert_eq!(ActionResult::ok(Value::Null, 1).learned_fact(), None);
    }

    #[test]
    fn test_summary_prefers_error() {
        let result = ActionResult::failed(ActionError::UnknownAction("fly".into()), 0);
        assert_eq!(result.summary(), "unknown action: fly");
        assert_eq!(ActionResult::ok(json!("done"), 0).summary(), "done");
    }

    #[test]
    fn test_error_serialization_is_tagged() {
        let value = serde_json::to_value(ActionError::Timeout {
            action: "wait".into(),
            timeout_ms: 10,
        })
        .unwrap();
        assert_eq!(value["type"], "timeout");
        assert_eq!(value["detail"]["timeout_ms"], 10);
    }
}
