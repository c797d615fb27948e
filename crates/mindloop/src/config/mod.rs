use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MindloopError, Result};

/// Main configuration structure for Mindloop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Orchestrator loop configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Memory engine configuration
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Ordered LLM backends; the order is the failover order
    #[serde(default = "default_providers")]
    pub providers: Vec<BackendConfig>,
    /// Backoff policy shared by all backends
    #[serde(default)]
    pub retry: RetryConfig,
    /// Action executor configuration
    #[serde(default)]
    pub actions: ActionsConfig,
    /// Reasoning engine configuration
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            memory: MemoryConfig::default(),
            providers: default_providers(),
            retry: RetryConfig::default(),
            actions: ActionsConfig::default(),
            reasoning: ReasoningConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| MindloopError::Config(format!("Failed to parse config: {e}")))?;
        config.memory.path = expand_home(&config.memory.path);
        config.agent.state_path = expand_home(&config.agent.state_path);
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MindloopError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from an explicit path, or the first existing default location, or defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for path in Self::default_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Candidate config locations, in lookup order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::home_dir().map(|h| h.join(".mindloop").join("config.toml")),
            dirs::config_dir().map(|c| c.join("mindloop").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(MindloopError::Config(
                "at least one [[providers]] entry is required".to_string(),
            ));
        }
        for provider in &self.providers {
            if provider.endpoint.trim().is_empty() {
                return Err(MindloopError::Config(format!(
                    "provider '{}' has an empty endpoint",
                    provider.display_name()
                )));
            }
            if provider.timeout_secs == 0 {
                return Err(MindloopError::Config(format!(
                    "provider '{}' must have a non-zero timeout",
                    provider.display_name()
                )));
            }
        }
        if self.memory.retrieval_budget_tokens == 0 {
            return Err(MindloopError::Config(
                "memory.retrieval_budget_tokens must be greater than zero".to_string(),
            ));
        }
        if self.memory.summarize_threshold_tokens == 0 {
            return Err(MindloopError::Config(
                "memory.summarize_threshold_tokens must be greater than zero".to_string(),
            ));
        }
        if self.memory.max_summary_tokens >= self.memory.summarize_threshold_tokens {
            return Err(MindloopError::Config(format!(
                "memory.max_summary_tokens ({}) must be smaller than memory.summarize_threshold_tokens ({})",
                self.memory.max_summary_tokens, self.memory.summarize_threshold_tokens
            )));
        }
        if self.memory.decay.scale_hours <= 0.0 {
            return Err(MindloopError::Config(
                "memory.decay.scale_hours must be positive".to_string(),
            ));
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            return Err(MindloopError::Config(format!(
                "retry.base_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.base_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        if self.actions.default_timeout_secs == 0 {
            return Err(MindloopError::Config(
                "actions.default_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Replace a leading `~` with the home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".mindloop"))
        .unwrap_or_else(|| PathBuf::from(".mindloop"))
}

/// Orchestrator loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Goal pursued from startup (can be replaced via `/goal`)
    #[serde(default)]
    pub goal: Option<String>,
    /// Pause between cycles in milliseconds
    #[serde(default = "default_loop_interval_ms")]
    pub loop_interval_ms: u64,
    /// Pause after a failed cycle in milliseconds
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Where the agent state is persisted between runs
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Send an outbound notification after every action
    #[serde(default = "default_notify_actions")]
    pub notify_actions: bool,
    /// Stop after this many cycles (unbounded when absent)
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            goal: None,
            loop_interval_ms: default_loop_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            state_path: default_state_path(),
            notify_actions: default_notify_actions(),
            max_cycles: None,
        }
    }
}

fn default_loop_interval_ms() -> u64 {
    100
}

fn default_error_backoff_ms() -> u64 {
    5000
}

fn default_state_path() -> PathBuf {
    default_data_dir().join("agent_state.json")
}

fn default_notify_actions() -> bool {
    true
}

/// Memory engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Durable memory file
    #[serde(default = "default_memory_path")]
    pub path: PathBuf,
    /// Token budget for the context handed to the reasoning engine
    #[serde(default = "default_retrieval_budget_tokens")]
    pub retrieval_budget_tokens: usize,
    /// Active content size above which a summarization pass runs
    #[serde(default = "default_summarize_threshold_tokens")]
    pub summarize_threshold_tokens: usize,
    /// Upper bound on the size of a generated summary
    #[serde(default = "default_max_summary_tokens")]
    pub max_summary_tokens: usize,
    /// Run summarization automatically after each cycle
    #[serde(default = "default_auto_summarize")]
    pub auto_summarize: bool,
    /// Age decay applied to importance during retrieval
    #[serde(default)]
    pub decay: DecayConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: default_memory_path(),
            retrieval_budget_tokens: default_retrieval_budget_tokens(),
            summarize_threshold_tokens: default_summarize_threshold_tokens(),
            max_summary_tokens: default_max_summary_tokens(),
            auto_summarize: default_auto_summarize(),
            decay: DecayConfig::default(),
        }
    }
}

fn default_memory_path() -> PathBuf {
    default_data_dir().join("memories.json")
}

fn default_retrieval_budget_tokens() -> usize {
    2000
}

fn default_summarize_threshold_tokens() -> usize {
    4000
}

fn default_max_summary_tokens() -> usize {
    150
}

fn default_auto_summarize() -> bool {
    true
}

/// Shape of the age decay curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecayCurveKind {
    /// `1 / (1 + age / scale)`
    #[default]
    Hyperbolic,
    /// `0.5 ^ (age / scale)`, scale is the half-life
    Exponential,
}

/// Age decay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    #[serde(default)]
    pub curve: DecayCurveKind,
    /// Time scale of the curve in hours
    #[serde(default = "default_decay_scale_hours")]
    pub scale_hours: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            curve: DecayCurveKind::default(),
            scale_hours: default_decay_scale_hours(),
        }
    }
}

fn default_decay_scale_hours() -> f64 {
    24.0
}

/// Supported backend wire protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ollama,
    OpenAi,
    LmStudio,
    Oobabooga,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::OpenAi => "openai",
            BackendKind::LmStudio => "lmstudio",
            BackendKind::Oobabooga => "oobabooga",
        }
    }
}

/// One entry of the ordered provider list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Wire protocol spoken by the backend
    pub kind: BackendKind,
    /// Display name used in logs and reports
    #[serde(default)]
    pub name: Option<String>,
    /// Base URL of the backend
    pub endpoint: String,
    /// Model identifier
    #[serde(default)]
    pub model: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first failed attempt before failing over
    #[serde(default = "default_backend_max_retries")]
    pub max_retries: u32,
    /// Environment variable holding an API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Default sampling temperature
    #[serde(default = "default_backend_temperature")]
    pub temperature: f32,
}

impl BackendConfig {
    /// Name shown in logs: explicit name or `kind@endpoint`
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}@{}", self.kind.as_str(), self.endpoint))
    }
}

fn default_providers() -> Vec<BackendConfig> {
    vec![BackendConfig {
        kind: BackendKind::Ollama,
        name: None,
        endpoint: "http://localhost:11434".to_string(),
        model: "llama3".to_string(),
        timeout_secs: default_backend_timeout_secs(),
        max_retries: default_backend_max_retries(),
        api_key_env: None,
        temperature: default_backend_temperature(),
    }]
}

fn default_backend_timeout_secs() -> u64 {
    30
}

fn default_backend_max_retries() -> u32 {
    3
}

fn default_backend_temperature() -> f32 {
    0.7
}

/// Exponential backoff bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

/// Action executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// Timeout applied to handlers registered without their own
    #[serde(default = "default_action_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Longest pause the `observe` action will take
    #[serde(default = "default_observe_max_secs")]
    pub observe_max_secs: u64,
    /// Longest pause the `wait` action will take
    #[serde(default = "default_wait_max_secs")]
    pub wait_max_secs: u64,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_action_timeout_secs(),
            observe_max_secs: default_observe_max_secs(),
            wait_max_secs: default_wait_max_secs(),
        }
    }
}

fn default_action_timeout_secs() -> u64 {
    30
}

fn default_observe_max_secs() -> u64 {
    60
}

fn default_wait_max_secs() -> u64 {
    300
}

/// Reasoning engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// How the agent describes itself in prompts
    #[serde(default = "default_persona")]
    pub persona: String,
    /// Action chosen when the model output cannot be parsed
    #[serde(default = "default_fallback_action")]
    pub fallback_action: String,
    /// Output token limit for decision requests
    #[serde(default = "default_reasoning_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Sampling temperature for decision requests
    #[serde(default = "default_reasoning_temperature")]
    pub temperature: f32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            fallback_action: default_fallback_action(),
            max_output_tokens: default_reasoning_max_output_tokens(),
            temperature: default_reasoning_temperature(),
        }
    }
}

fn default_persona() -> String {
    "a helpful and intelligent autonomous assistant".to_string()
}

fn default_fallback_action() -> String {
    "reflect".to_string()
}

fn default_reasoning_max_output_tokens() -> u32 {
    500
}

fn default_reasoning_temperature() -> f32 {
    0.3
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for the mindloop targets when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
