//! Agent state persisted between runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::error::{MindloopError, Result};
use crate::memory::write_atomic;

/// Counters and goal carried across restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub cycles: u64,
    #[serde(default)]
    pub actions_executed: u64,
    #[serde(default)]
    pub actions_failed: u64,
    /// Cycles that could not record their outcome
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub last_action: Option<String>,
    #[serde(default)]
    pub last_action_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_goal: Option<String>,
    /// Start of the current run
    #[serde(default = "Utc::now")]
    pub started_at: DateTime<Utc>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            cycles: 0,
            actions_executed: 0,
            actions_failed: 0,
            errors: 0,
            last_action: None,
            last_action_at: None,
            current_goal: None,
            started_at: Utc::now(),
        }
    }
}

impl AgentState {
    /// Load saved state; a missing file yields `None`
    ///
    /// The run start time is reset to now.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MindloopError::Storage(format!(
                    "failed to read agent state {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        let mut state: AgentState = serde_json::from_slice(&bytes).map_err(|e| {
            MindloopError::Storage(format!(
                "failed to parse agent state {}: {}",
                path.display(),
                e
            ))
        })?;
        state.started_at = Utc::now();
        Ok(Some(state))
    }

    /// Atomically write the state file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes).await.map_err(|e| {
            MindloopError::Storage(format!(
                "failed to save agent state {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Human-readable duration such as `2h 5m` or `42s`
pub fn format_uptime(uptime: chrono::Duration) -> String {
    let secs = uptime.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
    );
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
