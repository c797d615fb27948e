//! The perceive, retrieve, decide, act, record loop

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::actions::{ActionContext, ActionRegistry, ActionResult, register_builtins};
use crate::agent::commands::{HELP_TEXT, InboundCommand, parse_inbound};
use crate::agent::state::{AgentState, format_uptime};
use crate::channel::{Inbox, InboundMessage, Notifier, OutboundMessage};
use crate::config::Config;
use crate::error::{MindloopError, Result};
use crate::memory::{MemoryEngine, MemoryEntry, MemoryError, SummarizeOutcome};
use crate::provider::LlmProvider;
use crate::reasoning::{
    DecisionOutcome, DecisionRequest, ParseOutcome, ReasoningCounts, ReasoningEngine,
};

/// Importance of operator messages, which outrank everything but goals
const OPERATOR_IMPORTANCE: f32 = 0.9;
const SUCCESS_IMPORTANCE: f32 = 0.4;
const FAILURE_IMPORTANCE: f32 = 0.6;
const LEARNED_IMPORTANCE: f32 = 0.7;
/// Longest action summary carried in a notification
const NOTIFY_CHARS: usize = 200;

/// What happened during one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub decision: DecisionOutcome,
    pub result: ActionResult,
    /// Slash commands answered this cycle
    pub commands_handled: usize,
    /// Operator messages injected into the decision prompt
    pub urgent_messages: usize,
    pub summarize: Option<SummarizeOutcome>,
    /// Memory writes that failed this cycle
    pub errors: u32,
}

/// Autonomous agent
pub struct Agent {
    config: Arc<Config>,
    memory: Arc<MemoryEngine>,
    provider: Arc<LlmProvider>,
    actions: ActionRegistry,
    reasoning: ReasoningEngine,
    notifier: Arc<dyn Notifier>,
    inbox: Option<Inbox>,
    state: AgentState,
    urgent: Vec<String>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("actions", &self.actions.names())
            .field("backends", &self.provider.backend_names())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Assemble an agent from already-built components
    pub fn new(
        config: Arc<Config>,
        memory: Arc<MemoryEngine>,
        provider: Arc<LlmProvider>,
        actions: ActionRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let reasoning = ReasoningEngine::new(provider.clone(), config.reasoning.clone());
        Self {
            config,
            memory,
            provider,
            actions,
            reasoning,
            notifier,
            inbox: None,
            state: AgentState::default(),
            urgent: Vec::new(),
        }
    }

    pub fn with_inbox(mut self, inbox: Inbox) -> Self {
        self.inbox = Some(inbox);
        self
    }

    pub fn with_state(mut self, state: AgentState) -> Self {
        self.state = state;
        self
    }

    /// Build every component from config
    ///
    /// An unusable memory store is fatal. An unreachable provider is only
    /// logged, since backends may come up later and decisions fall back in
    /// the meantime.
    pub async fn start(
        config: Config,
        notifier: Arc<dyn Notifier>,
        inbox: Option<Inbox>,
    ) -> Result<Self> {
        let config = Arc::new(config);

        info!("Opening memory store at: {}", config.memory.path.display());
        let memory = MemoryEngine::open(&config.memory).await?;
        memory.flush().await?;
        let memory = Arc::new(memory);

        let provider = Arc::new(LlmProvider::from_config(&config)?);
        info!("Provider chain: {}", provider.backend_names().join(" -> "));
        let report = provider.test_connection().await;
        if report.reachable {
            info!(
                backend = %report.backend,
                model = %report.model,
                latency_ms = report.latency_ms,
                "Primary backend reachable"
            );
        } else {
            warn!(
                backend = %report.backend,
                "Primary backend unreachable: {}",
                report.error.as_deref().unwrap_or("unknown error")
            );
        }

        let actions = ActionRegistry::from_config(&config.actions);
        register_builtins(&actions, &config.actions)
            .map_err(|e| MindloopError::General(format!("failed to register actions: {e}")))?;
        if !actions.contains(&config.reasoning.fallback_action) {
            return Err(MindloopError::Config(format!(
                "reasoning.fallback_action '{}' is not a registered action (available: {})",
                config.reasoning.fallback_action,
                actions.names().join(", ")
            )));
        }

        let state = match AgentState::load(&config.agent.state_path).await {
            Ok(Some(state)) => {
                info!(cycles = state.cycles, "Resumed agent state");
                state
            }
            Ok(None) => AgentState::default(),
            Err(e) => {
                warn!("Starting with fresh state: {}", e);
                AgentState::default()
            }
        };

        let startup_goal = config.agent.goal.clone();
        let mut agent = Self::new(config, memory, provider, actions, notifier).with_state(state);
        if let Some(inbox) = inbox {
            agent = agent.with_inbox(inbox);
        }

        // A saved goal (possibly set by the operator) wins over the configured one
        if agent.state.current_goal.is_none() {
            if let Some(goal) = startup_goal {
                if let Err(e) = agent.set_goal(&goal).await {
                    warn!("Failed to record startup goal: {}", e);
                }
            }
        }

        Ok(agent)
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn memory(&self) -> &Arc<MemoryEngine> {
        &self.memory
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn reasoning_stats(&self) -> ReasoningCounts {
        self.reasoning.stats()
    }

    /// Replace the current goal and record it as a memory
    ///
    /// The goal changes even when the memory write fails.
    pub async fn set_goal(&mut self, goal: &str) -> std::result::Result<(), MemoryError> {
        let goal = goal.trim().to_string();
        info!("Goal set: {}", goal);
        self.state.current_goal = Some(goal.clone());
        self.memory
            .append(MemoryEntry::goal(goal).with_metadata("source", "operator"))
            .await
            .map(|_| ())
    }

    /// Multi-line status report
    pub async fn status_text(&self) -> String {
        let stats = self.memory.stats().await;
        let decisions = self.reasoning.stats();
        format!(
            "Agent status\n\
             Cycles: {}\n\
             Actions: {} ({} failed)\n\
             Errors: {}\n\
             Last action: {}\n\
             Goal: {}\n\
             Memories: {} active, {} archived ({} tokens)\n\
             Decisions: {} parsed, {} corrected, {} fallback\n\
             Uptime: {}",
            self.state.cycles,
            self.state.actions_executed,
            self.state.actions_failed,
            self.state.errors,
            self.state.last_action.as_deref().unwrap_or("none"),
            self.state.current_goal.as_deref().unwrap_or("none"),
            stats.active,
            stats.archived,
            stats.active_tokens,
            decisions.parsed,
            decisions.corrected,
            decisions.fallback,
            format_uptime(self.state.uptime()),
        )
    }

    /// Run cycles until shutdown is signalled or the cycle limit is reached
    ///
    /// The flag is checked between cycles only; a running action always
    /// finishes (or times out) first.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<AgentState> {
        info!(
            actions = self.actions.len(),
            goal = self.state.current_goal.as_deref().unwrap_or("none"),
            "Agent loop starting"
        );
        self.notify(OutboundMessage::info("Agent started")).await;

        let interval = Duration::from_millis(self.config.agent.loop_interval_ms);
        let backoff = Duration::from_millis(self.config.agent.error_backoff_ms);
        let mut completed: u64 = 0;

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested");
                break;
            }
            if let Some(max) = self.config.agent.max_cycles {
                if completed >= max {
                    info!(cycles = completed, "Cycle limit reached");
                    break;
                }
            }

            let report = self.run_cycle().await;
            completed += 1;

            if let Err(e) = self.state.save(&self.config.agent.state_path).await {
                warn!("Failed to save agent state: {}", e);
            }

            let pause = if report.errors > 0 { backoff } else { interval };
            if pause_or_shutdown(pause, &mut shutdown).await {
                info!("Shutdown requested");
                break;
            }
        }

        self.shutdown().await?;
        Ok(self.state.clone())
    }

    /// Persist state and say goodbye
    pub async fn shutdown(&mut self) -> Result<()> {
        self.state.save(&self.config.agent.state_path).await?;
        info!(cycles = self.state.cycles, "Agent stopped");
        self.notify(OutboundMessage::info(format!(
            "Agent stopped after {} cycles",
            self.state.cycles
        )))
        .await;
        Ok(())
    }

    /// One full cycle; failures are recorded, never propagated
    pub async fn run_cycle(&mut self) -> CycleReport {
        let cycle = self.state.cycles + 1;
        let mut errors = 0u32;
        debug!(cycle, "Cycle starting");

        let commands_handled = self.handle_inbound(&mut errors).await;

        let memories: Vec<_> = self
            .memory
            .retrieve(self.config.memory.retrieval_budget_tokens)
            .await
            .collect();
        let catalog = self.actions.describe();
        let urgent = std::mem::take(&mut self.urgent);

        let decision = self
            .reasoning
            .decide(&DecisionRequest {
                goal: self.state.current_goal.as_deref(),
                memories: &memories,
                urgent: &urgent,
                actions: &catalog,
            })
            .await;

        let ctx = ActionContext {
            config: self.config.clone(),
            memory: self.memory.clone(),
            provider: self.provider.clone(),
            notifier: self.notifier.clone(),
            goal: self.state.current_goal.clone(),
            cycle,
        };
        let action = decision.decision.action.clone();
        let result = self
            .actions
            .execute(&action, decision.decision.params.clone(), &ctx)
            .await;

        self.record(cycle, &decision, &result, &mut errors).await;

        self.state.cycles = cycle;
        self.state.actions_executed += 1;
        if !result.success {
            self.state.actions_failed += 1;
        }
        self.state.last_action = Some(action.clone());
        self.state.last_action_at = Some(Utc::now());
        self.state.errors += u64::from(errors);

        if self.config.agent.notify_actions {
            let text = format!("{}: {}", action, clip(&result.summary(), NOTIFY_CHARS));
            let message = if result.success {
                OutboundMessage::success(text)
            } else {
                OutboundMessage::failure(text)
            };
            self.notify(message).await;
        }

        let summarize = if self.config.memory.auto_summarize {
            match self.memory.summarize_if_needed(&self.provider).await {
                Ok(outcome) => {
                    if let SummarizeOutcome::Skipped { reason } = &outcome {
                        debug!("Summarization skipped: {}", reason);
                    }
                    Some(outcome)
                }
                Err(e) => {
                    warn!("Summarization failed: {}", e);
                    errors += 1;
                    self.state.errors += 1;
                    None
                }
            }
        } else {
            None
        };

        info!(
            cycle,
            action = %action,
            success = result.success,
            duration_ms = result.duration_ms,
            "Cycle complete"
        );

        CycleReport {
            cycle,
            decision,
            result,
            commands_handled,
            urgent_messages: urgent.len(),
            summarize,
            errors,
        }
    }

    /// Answer commands and queue operator text; returns commands handled
    async fn handle_inbound(&mut self, errors: &mut u32) -> usize {
        let messages = match self.inbox.as_mut() {
            Some(inbox) => inbox.drain(),
            None => return 0,
        };

        let mut handled = 0;
        for message in messages {
            match parse_inbound(&message.text) {
                InboundCommand::Message(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    self.observe_operator(&message, text, errors).await;
                }
                command => {
                    handled += 1;
                    self.answer(command, errors).await;
                }
            }
        }
        handled
    }

    async fn observe_operator(&mut self, message: &InboundMessage, text: String, errors: &mut u32) {
        info!(sender = %message.sender, "Operator message: {}", text);
        let entry = MemoryEntry::observation(format!("Message from {}: {}", message.sender, text))
            .with_importance(OPERATOR_IMPORTANCE)
            .with_timestamp(message.received_at)
            .with_metadata("source", "operator")
            .with_metadata("sender", message.sender.as_str());
        if let Err(e) = self.memory.append(entry).await {
            error!("Failed to record operator message: {}", e);
            *errors += 1;
        }
        self.urgent.push(text);
    }

    async fn answer(&mut self, command: InboundCommand, errors: &mut u32) {
        let reply = match command {
            InboundCommand::Status => OutboundMessage::info(self.status_text().await),
            InboundCommand::Ping => OutboundMessage::info("pong"),
            InboundCommand::Help => OutboundMessage::info(HELP_TEXT),
            InboundCommand::Goal(goal) if goal.is_empty() => {
                OutboundMessage::failure("Usage: /goal <text>")
            }
            InboundCommand::Goal(goal) => {
                if let Err(e) = self.set_goal(&goal).await {
                    error!("Failed to record goal: {}", e);
                    *errors += 1;
                }
                OutboundMessage::success(format!("Goal set: {goal}"))
            }
            InboundCommand::Unknown(name) => {
                OutboundMessage::failure(format!("Unknown command /{name}. Try /help"))
            }
            InboundCommand::Message(_) => return,
        };
        self.notify(reply).await;
    }

    async fn record(
        &self,
        cycle: u64,
        decision: &DecisionOutcome,
        result: &ActionResult,
        errors: &mut u32,
    ) {
        let action = decision.decision.action.as_str();
        let (verb, importance) = if result.success {
            ("succeeded", SUCCESS_IMPORTANCE)
        } else {
            ("failed", FAILURE_IMPORTANCE)
        };
        let entry = MemoryEntry::action_result(format!(
            "Action '{}' {}: {}",
            action,
            verb,
            result.summary()
        ))
        .with_importance(importance)
        .with_metadata("action", action)
        .with_metadata("success", result.success)
        .with_metadata("duration_ms", result.duration_ms)
        .with_metadata("cycle", cycle)
        .with_metadata("decision", outcome_label(&decision.outcome))
        .with_metadata("rationale", decision.decision.rationale.as_str());

        if let Err(e) = self.memory.append(entry).await {
            error!("Failed to record action result: {}", e);
            *errors += 1;
        }

        if let Some(fact) = result.learned_fact() {
            let category = result
                .output
                .get("category")
                .and_then(Value::as_str)
                .unwrap_or("general");
            let entry = MemoryEntry::reflection(fact)
                .with_importance(LEARNED_IMPORTANCE)
                .with_metadata("source", action)
                .with_metadata("category", category);
            if let Err(e) = self.memory.append(entry).await {
                error!("Failed to record learned fact: {}", e);
                *errors += 1;
            }
        }
    }

    async fn notify(&self, message: OutboundMessage) {
        if let Err(e) = self.notifier.send(message).await {
            warn!("Failed to send notification: {}", e);
        }
    }
}

fn outcome_label(outcome: &ParseOutcome) -> &'static str {
    match outcome {
        ParseOutcome::Parsed => "parsed",
        ParseOutcome::Corrected { .. } => "corrected",
        ParseOutcome::Fallback { .. } => "fallback",
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut clipped: String = text.chars().take(max_chars).collect();
        clipped.push_str("...");
        clipped
    }
}

/// Sleep for `duration` unless shutdown is signalled first; true on shutdown
async fn pause_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => match changed {
            Ok(()) => *shutdown.borrow(),
            Err(_) => {
                // Sender gone: nobody can ask us to stop any more
                tokio::time::sleep(duration).await;
                false
            }
        },
    }
}
