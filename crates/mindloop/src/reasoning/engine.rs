//! Reasoning engine: prompt construction, one provider call, resilient parsing
//!
//! A rejected answer gets exactly one corrective follow-up that echoes the
//! parse error. If that also fails, or the provider is exhausted, the engine
//! returns the configured fallback decision instead of an error.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::actions::ActionDescriptor;
use crate::config::ReasoningConfig;
use crate::memory::ScoredEntry;
use crate::provider::{GenerateOptions, LlmProvider};
use crate::reasoning::parser::{Decision, parse_decision};
use crate::reasoning::prompts::{CORRECTION_PROMPT, DECISION_PROMPT, DEFAULT_GOAL, render};

/// Longest slice of a rejected answer echoed back to the model
const ECHO_CHARS: usize = 500;

/// Everything a decision is based on
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub goal: Option<&'a str>,
    pub memories: &'a [ScoredEntry],
    /// Operator messages to treat as high priority this cycle
    pub urgent: &'a [String],
    pub actions: &'a [ActionDescriptor],
}

/// How the decision was obtained
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParseOutcome {
    /// First answer was usable
    Parsed,
    /// Second answer was usable after a corrective prompt
    Corrected { first_error: String },
    /// Neither answer was usable, or the provider failed
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub outcome: ParseOutcome,
    /// Provider requests made for this decision (0, 1 or 2)
    pub provider_calls: u32,
}

/// Running totals of parse outcomes
#[derive(Debug, Default)]
pub struct ReasoningStats {
    parsed: AtomicU64,
    corrected: AtomicU64,
    fallback: AtomicU64,
}

/// Point-in-time copy of [`ReasoningStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReasoningCounts {
    pub parsed: u64,
    pub corrected: u64,
    pub fallback: u64,
}

impl ReasoningStats {
    fn record(&self, outcome: &ParseOutcome) {
        let counter = match outcome {
            ParseOutcome::Parsed => &self.parsed,
            ParseOutcome::Corrected { .. } => &self.corrected,
            ParseOutcome::Fallback { .. } => &self.fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReasoningCounts {
        ReasoningCounts {
            parsed: self.parsed.load(Ordering::Relaxed),
            corrected: self.corrected.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct ReasoningEngine {
    provider: Arc<LlmProvider>,
    config: ReasoningConfig,
    stats: ReasoningStats,
}

impl ReasoningEngine {
    pub fn new(provider: Arc<LlmProvider>, config: ReasoningConfig) -> Self {
        Self {
            provider,
            config,
            stats: ReasoningStats::default(),
        }
    }

    pub fn stats(&self) -> ReasoningCounts {
        self.stats.snapshot()
    }

    /// Render the decision prompt
    pub fn build_prompt(&self, request: &DecisionRequest<'_>) -> String {
        let urgent = if request.urgent.is_empty() {
            String::new()
        } else {
            let lines = request
                .urgent
                .iter()
                .map(|m| format!("- {m}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("\nHigh-priority messages from the operator (address these first):\n{lines}\n")
        };

        let actions = request
            .actions
            .iter()
            .map(|a| {
                if a.description.is_empty() {
                    format!("- {} {}", a.name, a.schema.signature())
                } else {
                    format!("- {} {}: {}", a.name, a.schema.signature(), a.description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        let memories = if request.memories.is_empty() {
            "(no memories yet)".to_string()
        } else {
            request
                .memories
                .iter()
                .map(|m| {
                    format!(
                        "- [{}] ({}, importance {:.2}) {}",
                        m.entry.timestamp().format("%Y-%m-%d %H:%M"),
                        m.entry.kind(),
                        m.entry.importance(),
                        m.entry.content()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        render(
            DECISION_PROMPT,
            &[
                ("persona", self.config.persona.as_str()),
                ("goal", request.goal.unwrap_or(DEFAULT_GOAL)),
                ("urgent", urgent.as_str()),
                ("actions", actions.as_str()),
                ("memories", memories.as_str()),
            ],
        )
    }

    /// Decide the next action; never fails
    pub async fn decide(&self, request: &DecisionRequest<'_>) -> DecisionOutcome {
        let known: Vec<String> = request.actions.iter().map(|a| a.name.clone()).collect();
        let prompt = self.build_prompt(request);
        let options = GenerateOptions {
            max_tokens: Some(self.config.max_output_tokens),
            temperature: Some(self.config.temperature),
            system: None,
        };

        let first = match self.provider.generate(&prompt, &options).await {
            Ok(generation) => generation,
            Err(e) => return self.fallback(format!("provider failed: {e}"), 1),
        };
        debug!(backend = %first.backend, "Decision response: {}", first.text);

        let first_error = match parse_decision(&first.text, &known) {
            Ok(decision) => return self.finish(decision, ParseOutcome::Parsed, 1),
            Err(e) => e,
        };
        warn!("Decision unparseable, asking for a correction: {}", first_error);

        let echoed: String = first.text.chars().take(ECHO_CHARS).collect();
        let error_text = first_error.to_string();
        let action_names = known.join(", ");
        let correction = render(
            CORRECTION_PROMPT,
            &[
                ("original", prompt.as_str()),
                ("response", echoed.as_str()),
                ("error", error_text.as_str()),
                ("action_names", action_names.as_str()),
            ],
        );

        let second = match self.provider.generate(&correction, &options).await {
            Ok(generation) => generation,
            Err(e) => return self.fallback(format!("provider failed during correction: {e}"), 2),
        };

        match parse_decision(&second.text, &known) {
            Ok(decision) => self.finish(
                decision,
                ParseOutcome::Corrected {
                    first_error: error_text,
                },
                2,
            ),
            Err(second_error) => self.fallback(
                format!("unparseable after correction: {first_error}; then {second_error}"),
                2,
            ),
        }
    }

    fn fallback(&self, reason: String, provider_calls: u32) -> DecisionOutcome {
        warn!(fallback = %self.config.fallback_action, "Using fallback decision: {}", reason);
        let decision = Decision::new(
            self.config.fallback_action.clone(),
            format!("fallback: {reason}"),
        );
        self.finish(decision, ParseOutcome::Fallback { reason }, provider_calls)
    }

    fn finish(&self, decision: Decision, outcome: ParseOutcome, provider_calls: u32) -> DecisionOutcome {
        self.stats.record(&outcome);
        if !matches!(outcome, ParseOutcome::Fallback { .. }) {
            info!(action = %decision.action, "Decided: {}", decision.rationale);
        }
        DecisionOutcome {
            decision,
            outcome,
            provider_calls,
        }
    }
}
