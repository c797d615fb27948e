//! Memory entry types
//!
//! Entries are immutable once created. The only state that changes after an
//! append is the archive mark carried by [`MemoryRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Inclusive bounds of the importance scale
pub const IMPORTANCE_RANGE: (f32, f32) = (0.0, 1.0);

/// Approximate token count of a piece of text (one token per four characters, rounded up)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Kind of memory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryKind {
    /// Something the agent perceived
    Observation,
    /// Internal thought produced by the agent
    Reflection,
    /// Outcome of an executed action
    ActionResult,
    /// Condensed replacement for archived entries
    Summary,
    /// Goal assigned to the agent
    Goal,
}

impl MemoryKind {
    /// Importance assigned when the caller does not provide one
    pub fn default_importance(&self) -> f32 {
        match self {
            MemoryKind::Observation => 0.5,
            MemoryKind::Reflection => 0.6,
            MemoryKind::ActionResult => 0.4,
            MemoryKind::Summary => 0.7,
            MemoryKind::Goal => 0.9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Observation => "observation",
            MemoryKind::Reflection => "reflection",
            MemoryKind::ActionResult => "action-result",
            MemoryKind::Summary => "summary",
            MemoryKind::Goal => "goal",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "observation" => Ok(MemoryKind::Observation),
            "reflection" => Ok(MemoryKind::Reflection),
            "action-result" | "action_result" => Ok(MemoryKind::ActionResult),
            "summary" => Ok(MemoryKind::Summary),
            "goal" => Ok(MemoryKind::Goal),
            other => Err(format!("unknown memory kind: {other}")),
        }
    }
}

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Int(i) => write!(f, "{i}"),
            MetadataValue::Float(x) => write!(f, "{x}"),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        MetadataValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        MetadataValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

/// A single memory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    id: Uuid,
    content: String,
    timestamp: DateTime<Utc>,
    importance: f32,
    kind: MemoryKind,
    #[serde(default)]
    metadata: BTreeMap<String, MetadataValue>,
}

impl MemoryEntry {
    /// Create a new entry stamped with the current time and the kind's default importance
    pub fn new(kind: MemoryKind, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            timestamp: Utc::now(),
            importance: kind.default_importance(),
            kind,
            metadata: BTreeMap::new(),
        }
    }

    pub fn observation(content: impl Into<String>) -> Self {
        Self::new(MemoryKind::Observation, content)
    }

    pub fn reflection(content: impl Into<String>) -> Self {
        Self::new(MemoryKind::Reflection, content)
    }

    pub fn action_result(content: impl Into<String>) -> Self {
        Self::new(MemoryKind::ActionResult, content)
    }

    pub fn goal(content: impl Into<String>) -> Self {
        Self::new(MemoryKind::Goal, content)
    }

    /// Override the importance (validated on append)
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    /// Override the creation time
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a metadata value
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn importance(&self) -> f32 {
        self.importance
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn metadata(&self) -> &BTreeMap<String, MetadataValue> {
        &self.metadata
    }

    pub fn token_estimate(&self) -> usize {
        estimate_tokens(&self.content)
    }

    /// Check the append preconditions
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.content.trim().is_empty() {
            return Err(MemoryError::EmptyContent);
        }
        let (low, high) = IMPORTANCE_RANGE;
        if !self.importance.is_finite() || self.importance < low || self.importance > high {
            return Err(MemoryError::ImportanceOutOfRange(self.importance));
        }
        Ok(())
    }
}

/// A stored entry plus its archive mark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(flatten)]
    pub entry: MemoryEntry,
    /// Summary entry that superseded this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    pub fn active(entry: MemoryEntry) -> Self {
        Self {
            entry,
            archived_by: None,
            archived_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.archived_by.is_none()
    }

    pub fn archive(&mut self, summary_id: Uuid, at: DateTime<Utc>) {
        self.archived_by = Some(summary_id);
        self.archived_at = Some(at);
    }
}

/// A retrieved entry with the score it was ranked by
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: MemoryEntry,
    pub score: f64,
}

/// Memory engine errors
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("memory content must not be empty")]
    EmptyContent,

    #[error("importance {0} is outside the allowed range 0.0-1.0")]
    ImportanceOutOfRange(f32),

    #[error("failed to persist memory store: {0}")]
    Write(String),

    #[error("failed to load memory store: {0}")]
    Load(String),
}
