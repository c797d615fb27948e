//! Built-in actions registered at startup

use futures::FutureExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::actions::registry::ActionRegistry;
use crate::actions::schema::{ParamKind, ParamSchema};
use crate::actions::types::{ActionContext, ActionError, FnHandler, Params};
use crate::channel::OutboundMessage;
use crate::config::ActionsConfig;

/// Extra time granted beyond the longest pause an action can take
const PAUSE_GRACE: Duration = Duration::from_secs(5);

const PREVIEW_CHARS: usize = 200;

fn string_param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str)
}

/// Seconds from a numeric parameter, clamped to `[0, max]`
fn duration_param(params: &Params, name: &str, default: f64, max: u64) -> Duration {
    let secs = params.get(name).and_then(Value::as_f64).unwrap_or(default);
    Duration::from_secs_f64(secs.clamp(0.0, max as f64))
}

fn preview(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let head: String = text.chars().take(limit).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

async fn observe(params: Params, ctx: ActionContext, max_secs: u64) -> Result<Value, ActionError> {
    let pause = duration_param(&params, "duration_secs", 10.0, max_secs);
    tokio::time::sleep(pause).await;
    let stats = ctx.memory.stats().await;
    Ok(json!({
        "observation": "Monitoring completed",
        "duration_secs": pause.as_secs_f64(),
        "active_memories": stats.active,
    }))
}

async fn reflect(params: Params, ctx: ActionContext) -> Result<Value, ActionError> {
    let topic = string_param(&params, "topic").unwrap_or("general reflection");
    let recent: Vec<String> = ctx
        .memory
        .recent(3)
        .await
        .iter()
        .map(|e| preview(e.content(), 80))
        .collect();
    Ok(json!({
        "reflection": format!("Reflected on {topic}"),
        "recent": recent,
    }))
}

async fn wait(params: Params, max_secs: u64) -> Result<Value, ActionError> {
    let pause = duration_param(&params, "duration_secs", 5.0, max_secs);
    tokio::time::sleep(pause).await;
    Ok(json!({ "waited_secs": pause.as_secs_f64() }))
}

async fn communicate(params: Params, ctx: ActionContext) -> Result<Value, ActionError> {
    let message = string_param(&params, "message").unwrap_or_default().to_string();
    if message.trim().is_empty() {
        return Err(ActionError::Failed("message must not be empty".to_string()));
    }
    ctx.notifier
        .send(OutboundMessage::info(message.clone()))
        .await
        .map_err(|e| ActionError::Failed(e.to_string()))?;
    Ok(json!({ "message": message, "sent": true }))
}

async fn learn(params: Params) -> Result<Value, ActionError> {
    let information = string_param(&params, "information")
        .unwrap_or_default()
        .trim()
        .to_string();
    if information.is_empty() {
        return Err(ActionError::Failed(
            "information to learn is required".to_string(),
        ));
    }
    let category = string_param(&params, "category").unwrap_or("general");
    debug!(%category, "Learning fact");
    Ok(json!({
        "learned_fact": information,
        "category": category,
    }))
}

async fn analyze(params: Params) -> Result<Value, ActionError> {
    let data = string_param(&params, "data").unwrap_or_default();
    if data.is_empty() {
        return Err(ActionError::Failed("data to analyze is required".to_string()));
    }
    Ok(json!({
        "type": string_param(&params, "type").unwrap_or("general"),
        "word_count": data.split_whitespace().count(),
        "character_count": data.chars().count(),
        "line_count": data.lines().count(),
        "data_preview": preview(data, PREVIEW_CHARS),
    }))
}

/// Register observe, reflect, wait, communicate, learn and analyze
pub fn register_builtins(
    registry: &ActionRegistry,
    config: &ActionsConfig,
) -> Result<(), ActionError> {
    let observe_max = config.observe_max_secs;
    registry.register_with_timeout(
        "observe",
        Arc::new(FnHandler::new(
            "Passively monitor the environment for a while",
            move |params, ctx| observe(params, ctx, observe_max).boxed(),
        )),
        ParamSchema::new().optional(
            "duration_secs",
            ParamKind::Number,
            "how long to observe, in seconds",
        ),
        Duration::from_secs(observe_max) + PAUSE_GRACE,
    )?;

    registry.register(
        "reflect",
        Arc::new(FnHandler::new(
            "Reflect internally on recent experience",
            |params, ctx| reflect(params, ctx).boxed(),
        )),
        ParamSchema::new().optional("topic", ParamKind::String, "what to reflect on"),
    )?;

    let wait_max = config.wait_max_secs;
    registry.register_with_timeout(
        "wait",
        Arc::new(FnHandler::new(
            "Pause before acting again",
            move |params, _ctx| wait(params, wait_max).boxed(),
        )),
        ParamSchema::new().optional(
            "duration_secs",
            ParamKind::Number,
            "how long to wait, in seconds",
        ),
        Duration::from_secs(wait_max) + PAUSE_GRACE,
    )?;

    registry.register(
        "communicate",
        Arc::new(FnHandler::new(
            "Send a message to the operator",
            |params, ctx| communicate(params, ctx).boxed(),
        )),
        ParamSchema::new().required("message", ParamKind::String, "text to send"),
    )?;

    registry.register(
        "learn",
        Arc::new(FnHandler::new(
            "Store a fact in long-term memory",
            |params, _ctx| learn(params).boxed(),
        )),
        ParamSchema::new()
            .required("information", ParamKind::String, "the fact to remember")
            .optional("category", ParamKind::String, "topic of the fact"),
    )?;

    registry.register(
        "analyze",
        Arc::new(FnHandler::new(
            "Break down a piece of text",
            |params, _ctx| analyze(params).boxed(),
        )),
        ParamSchema::new()
            .required("data", ParamKind::String, "text to analyze")
            .optional("type", ParamKind::String, "kind of analysis"),
    )?;

    Ok(())
}
