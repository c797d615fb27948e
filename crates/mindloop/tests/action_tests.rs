//! Integration tests for the action registry and executor

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

use mindloop::actions::{
    ActionContext, ActionError, ActionHandler, ActionRegistry, FnHandler, ParamKind, ParamSchema,
    Params,
};
use mindloop::testing::action_context;

// =============================================================================
// Test handlers
// =============================================================================

/// Replies with a fixed tag so tests can tell registrations apart
struct Tagged(&'static str);

#[async_trait]
impl ActionHandler for Tagged {
    fn description(&self) -> &str {
        "Reply with a tag"
    }

    async fn call(&self, _params: Params, _ctx: ActionContext) -> Result<Value, ActionError> {
        Ok(json!({ "tag": self.0 }))
    }
}

/// Never finishes
struct Stuck;

#[async_trait]
impl ActionHandler for Stuck {
    async fn call(&self, _params: Params, _ctx: ActionContext) -> Result<Value, ActionError> {
        std::future::pending::<()>().await;
        Ok(Value::Null)
    }
}

/// Panics on every call
struct Explodes;

#[async_trait]
impl ActionHandler for Explodes {
    async fn call(&self, _params: Params, _ctx: ActionContext) -> Result<Value, ActionError> {
        panic!("handler blew up");
    }
}

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_duplicate_registration_keeps_original() {
    let dir = tempdir().unwrap();
    let (ctx, _) = action_context(dir.path()).await.unwrap();
    let registry = ActionRegistry::new(Duration::from_secs(5));

    registry
        .register("tag", Arc::new(Tagged("original")), ParamSchema::new())
        .unwrap();
    let err = registry
        .register("tag", Arc::new(Tagged("impostor")), ParamSchema::new())
        .unwrap_err();

    assert_eq!(err, ActionError::Duplicate("tag".to_string()));
    assert_eq!(registry.names(), vec!["tag"]);

    let result = registry.execute("tag", Params::new(), &ctx).await;
    assert_eq!(result.output["tag"], "original");
}

#[tokio::test]
async fn test_unregister_then_register_again() {
    let dir = tempdir().unwrap();
    let (ctx, _) = action_context(dir.path()).await.unwrap();
    let registry = ActionRegistry::new(Duration::from_secs(5));

    registry
        .register("tag", Arc::new(Tagged("v1")), ParamSchema::new())
        .unwrap();
    assert!(registry.unregister("tag"));
    assert!(!registry.unregister("tag"));
    assert!(registry.is_empty());

    registry
        .register("tag", Arc::new(Tagged("v2")), ParamSchema::new())
        .unwrap();
    let result = registry.execute("tag", Params::new(), &ctx).await;
    assert_eq!(result.output["tag"], "v2");
}

#[tokio::test]
async fn test_describe_is_sorted_with_signatures() {
    let registry = ActionRegistry::new(Duration::from_secs(5));
    registry
        .register(
            "zeta",
            Arc::new(Tagged("z")),
            ParamSchema::new().required("target", ParamKind::String, "what to poke"),
        )
        .unwrap();
    registry
        .register("alpha", Arc::new(Tagged("a")), ParamSchema::new())
        .unwrap();

    let catalog = registry.describe();
    assert_eq!(catalog[0].name, "alpha");
    assert_eq!(catalog[1].name, "zeta");
    assert_eq!(catalog[1].description, "Reply with a tag");
    assert_eq!(catalog[1].schema.signature(), "{target: string}");
}

// =============================================================================
// Execution failures
// =============================================================================

#[tokio::test]
async fn test_unknown_action_is_a_failed_result() {
    let dir = tempdir().unwrap();
    let (ctx, _) = action_context(dir.path()).await.unwrap();
    let registry = ActionRegistry::new(Duration::from_secs(5));

    let result = registry.execute("fly", Params::new(), &ctx).await;

    assert!(!result.success);
    assert_eq!(
        result.error,
        Some(ActionError::UnknownAction("fly".to_string()))
    );
}

#[tokio::test]
async fn test_invalid_params_never_reach_the_handler() {
    let dir = tempdir().unwrap();
    let (ctx, _) = action_context(dir.path()).await.unwrap();
    let registry = ActionRegistry::new(Duration::from_secs(5));
    registry
        .register(
            "explode",
            Arc::new(Explodes),
            ParamSchema::new().required("count", ParamKind::Integer, "how many"),
        )
        .unwrap();

    let result = registry
        .execute("explode", params(json!({"count": "three"})), &ctx)
        .await;

    match result.error {
        Some(ActionError::InvalidParams { action, reason }) => {
            assert_eq!(action, "explode");
            assert!(reason.contains("count"));
        }
        other => panic!("expected invalid params, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stuck_handler_times_out_within_window() {
    let dir = tempdir().unwrap();
    let (ctx, _) = action_context(dir.path()).await.unwrap();
    let registry = ActionRegistry::new(Duration::from_secs(30));
    registry
        .register_with_timeout(
            "stuck",
            Arc::new(Stuck),
            ParamSchema::new(),
            Duration::from_millis(100),
        )
        .unwrap();

    let started = Instant::now();
    let result = registry.execute("stuck", Params::new(), &ctx).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        result.error,
        Some(ActionError::Timeout {
            action: "stuck".to_string(),
            timeout_ms: 100
        })
    );
}

#[tokio::test]
async fn test_panicking_handler_is_isolated() {
    let dir = tempdir().unwrap();
    let (ctx, _) = action_context(dir.path()).await.unwrap();
    let registry = ActionRegistry::new(Duration::from_secs(5));
    registry
        .register("explode", Arc::new(Explodes), ParamSchema::new())
        .unwrap();
    registry
        .register("tag", Arc::new(Tagged("still here")), ParamSchema::new())
        .unwrap();

    let result = registry.execute("explode", Params::new(), &ctx).await;
    assert_eq!(
        result.error,
        Some(ActionError::Panicked("explode".to_string()))
    );

    // The registry keeps working after a handler panic
    let result = registry.execute("tag", Params::new(), &ctx).await;
    assert!(result.success);
}

#[tokio::test]
async fn test_closure_handler_sees_context() {
    let dir = tempdir().unwrap();
    let (mut ctx, _) = action_context(dir.path()).await.unwrap();
    ctx.goal = Some("count the bees".to_string());
    let registry = ActionRegistry::new(Duration::from_secs(5));
    registry
        .register(
            "whoami",
            Arc::new(FnHandler::new("Report the goal", |_params, ctx| {
                async move { Ok(json!({ "goal": ctx.goal, "cycle": ctx.cycle })) }.boxed()
            })),
            ParamSchema::new(),
        )
        .unwrap();

    let result = registry.execute("whoami", Params::new(), &ctx).await;
    assert!(result.success);
    assert_eq!(result.output["goal"], "count the bees");
    assert_eq!(result.output["cycle"], 1);
}

#[tokio::test]
async fn test_handler_error_is_reported() {
    let dir = tempdir().unwrap();
    let (ctx, _) = action_context(dir.path()).await.unwrap();
    let registry = ActionRegistry::new(Duration::from_secs(5));
    registry
        .register(
            "refuse",
            Arc::new(FnHandler::new("Always refuse", |_params, _ctx| {
                async move { Err(ActionError::Failed("not today".to_string())) }.boxed()
            })),
            ParamSchema::new(),
        )
        .unwrap();

    let result = registry.execute("refuse", Params::new(), &ctx).await;
    assert!(!result.success);
    assert_eq!(result.summary(), "action failed: not today");
}
