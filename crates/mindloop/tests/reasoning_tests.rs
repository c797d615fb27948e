//! Integration tests for the reasoning engine
//!
//! Exercises the parse, correct, fall back sequence end to end against a
//! scripted backend.

use std::sync::Arc;

use mindloop::actions::{ActionDescriptor, ActionRegistry, register_builtins};
use mindloop::config::{ActionsConfig, ReasoningConfig};
use mindloop::provider::{LlmProvider, ProviderError, RetryPolicy};
use mindloop::reasoning::{DecisionRequest, ParseOutcome, ReasoningCounts, ReasoningEngine};
use mindloop::testing::{ScriptedBackend, scripted_provider};

fn catalog() -> Vec<ActionDescriptor> {
    let config = ActionsConfig::default();
    let registry = ActionRegistry::from_config(&config);
    register_builtins(&registry, &config).unwrap();
    registry.describe()
}

fn request<'a>(actions: &'a [ActionDescriptor], urgent: &'a [String]) -> DecisionRequest<'a> {
    DecisionRequest {
        goal: Some("Keep the aquarium healthy"),
        memories: &[],
        urgent,
        actions,
    }
}

#[tokio::test]
async fn test_prose_wrapped_answer_is_accepted() {
    let (provider, _) = scripted_provider(vec![
        "Sure! Here is my decision:\n```json\n{\"action\": \"Analyze\", \"parameters\": {\"data\": \"pH 6.5\"}, \"reasoning\": \"check water\"}\n```",
    ]);
    let engine = ReasoningEngine::new(Arc::new(provider), ReasoningConfig::default());
    let actions = catalog();

    let outcome = engine.decide(&request(&actions, &[])).await;

    assert_eq!(outcome.outcome, ParseOutcome::Parsed);
    assert_eq!(outcome.decision.action, "analyze");
    assert_eq!(outcome.decision.params["data"], "pH 6.5");
    assert_eq!(outcome.decision.rationale, "check water");
}

#[tokio::test]
async fn test_second_answer_after_correction() {
    let (provider, backend) = scripted_provider(vec![
        r#"{"action": "dance", "params": {}, "rationale": "fun"}"#,
        r#"{"action": "wait", "params": {"duration_secs": 1}, "rationale": "nothing to do"}"#,
    ]);
    let engine = ReasoningEngine::new(Arc::new(provider), ReasoningConfig::default());
    let actions = catalog();

    let outcome = engine.decide(&request(&actions, &[])).await;

    assert_eq!(outcome.decision.action, "wait");
    assert_eq!(outcome.provider_calls, 2);
    let ParseOutcome::Corrected { first_error } = &outcome.outcome else {
        panic!("expected a corrected outcome, got {:?}", outcome.outcome);
    };
    assert!(first_error.contains("unknown action 'dance'"));

    // The correction echoes the rejected answer and the reason
    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].starts_with(&prompts[0]));
    assert!(prompts[1].contains(r#""action": "dance""#));
    assert!(prompts[1].contains("unknown action 'dance'"));
}

#[tokio::test]
async fn test_fallback_after_two_bad_answers() {
    let (provider, backend) =
        scripted_provider(vec!["I think we should wait.", "{ still not json"]);
    let config = ReasoningConfig {
        fallback_action: "observe".to_string(),
        ..ReasoningConfig::default()
    };
    let engine = ReasoningEngine::new(Arc::new(provider), config);
    let actions = catalog();

    let outcome = engine.decide(&request(&actions, &[])).await;

    assert_eq!(outcome.decision.action, "observe");
    assert!(outcome.decision.params.is_empty());
    assert!(outcome.decision.rationale.starts_with("fallback:"));
    assert!(matches!(outcome.outcome, ParseOutcome::Fallback { .. }));
    // Exactly one correction, never a third request
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_fallback_when_every_provider_is_down() {
    let down = Arc::new(ScriptedBackend::new("down"));
    for _ in 0..3 {
        down.push_error(ProviderError::Connection("refused".into()));
    }
    let provider = LlmProvider::new(RetryPolicy::immediate()).with_backend(down.clone(), 2);
    let engine = ReasoningEngine::new(Arc::new(provider), ReasoningConfig::default());
    let actions = catalog();

    let outcome = engine.decide(&request(&actions, &[])).await;

    assert_eq!(outcome.decision.action, "reflect");
    assert_eq!(outcome.provider_calls, 1);
    let ParseOutcome::Fallback { reason } = &outcome.outcome else {
        panic!("expected fallback, got {:?}", outcome.outcome);
    };
    assert!(reason.contains("providers exhausted"));
    assert_eq!(down.calls(), 3);
}

#[tokio::test]
async fn test_urgent_messages_reach_the_prompt() {
    let (provider, backend) = scripted_provider(vec![
        r#"{"action": "communicate", "params": {"message": "on it"}, "rationale": "operator asked"}"#,
    ]);
    let engine = ReasoningEngine::new(Arc::new(provider), ReasoningConfig::default());
    let actions = catalog();
    let urgent = vec!["Feed the fish now".to_string()];

    engine.decide(&request(&actions, &urgent)).await;

    let prompts = backend.prompts();
    let prompt = &prompts[0];
    assert!(prompt.contains("High-priority messages from the operator"));
    assert!(prompt.contains("- Feed the fish now"));
    assert!(prompt.contains("Current goal: Keep the aquarium healthy"));
}

#[tokio::test]
async fn test_stats_count_each_outcome() {
    let (provider, _) = scripted_provider(vec![
        r#"{"action": "reflect", "params": {}, "rationale": "a"}"#,
        "garbage",
        r#"{"action": "reflect", "params": {}, "rationale": "b"}"#,
        "garbage",
        "more garbage",
    ]);
    let engine = ReasoningEngine::new(Arc::new(provider), ReasoningConfig::default());
    let actions = catalog();

    for _ in 0..3 {
        engine.decide(&request(&actions, &[])).await;
    }

    assert_eq!(
        engine.stats(),
        ReasoningCounts {
            parsed: 1,
            corrected: 1,
            fallback: 1,
        }
    );
}
