//! Memory engine: append, retrieval and summarization over the durable store
//!
//! The record list sits behind an `RwLock` so reads run concurrently and always
//! see a complete snapshot. Every mutation first takes the writer mutex, writes
//! the full next state to disk, and only then publishes it in memory, so a
//! failed write leaves memory and disk unchanged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::memory::decay::DecayCurve;
use crate::memory::store::MemoryFile;
use crate::memory::types::{MemoryEntry, MemoryError, MemoryKind, MemoryRecord, ScoredEntry};
use crate::provider::{GenerateOptions, LlmProvider};

/// Prompt used to condense a block of old entries
pub const SUMMARY_PROMPT: &str = r#"You maintain the long-term memory of an autonomous agent.
Condense the following memories into one short paragraph of at most {max_tokens} tokens.
Keep facts, decisions, results and open problems. Drop repetition and small talk.
Respond with the summary text only.

Memories (oldest first):
{memories}"#;

/// Result of a summarization pass
#[derive(Debug, Clone, PartialEq)]
pub enum SummarizeOutcome {
    /// Active content is within the ceiling
    NotNeeded,
    /// A summary entry replaced `consumed` active entries
    Summarized {
        summary_id: Uuid,
        consumed: usize,
        tokens_before: usize,
        tokens_after: usize,
    },
    /// Nothing changed; the pass will be retried on a later trigger
    Skipped { reason: String },
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total: usize,
    pub active: usize,
    pub archived: usize,
    pub by_kind: BTreeMap<MemoryKind, usize>,
    pub active_tokens: usize,
    pub average_importance: f64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Lazily walked retrieval result
///
/// Holds a score-ordered snapshot and yields, in score order, every entry that
/// still fits in the remaining token budget. An entry too large for what is
/// left is skipped so smaller, lower-ranked entries can still be returned.
#[derive(Debug)]
pub struct Retrieval {
    ranked: std::vec::IntoIter<ScoredEntry>,
    budget: usize,
    used: usize,
}

impl Retrieval {
    /// Tokens consumed by the entries yielded so far
    pub fn tokens_used(&self) -> usize {
        self.used
    }
}

impl Iterator for Retrieval {
    type Item = ScoredEntry;

    fn next(&mut self) -> Option<Self::Item> {
        // Every entry costs at least one token
        while self.used < self.budget {
            let candidate = self.ranked.next()?;
            let cost = candidate.entry.token_estimate();
            if self.used + cost > self.budget {
                continue;
            }
            self.used += cost;
            return Some(candidate);
        }
        None
    }
}

/// Durable memory with importance-weighted retrieval
#[derive(Debug)]
pub struct MemoryEngine {
    records: RwLock<Vec<MemoryRecord>>,
    writer: Mutex<()>,
    file: MemoryFile,
    decay: DecayCurve,
    summarize_threshold_tokens: usize,
    max_summary_tokens: usize,
}

impl MemoryEngine {
    /// Load the durable store described by `config`
    pub async fn open(config: &MemoryConfig) -> Result<Self, MemoryError> {
        let file = MemoryFile::new(&config.path);
        let records = file.load().await?;
        info!(
            "Loaded {} memory records from {}",
            records.len(),
            file.path().display()
        );

        Ok(Self {
            records: RwLock::new(records),
            writer: Mutex::new(()),
            file,
            decay: DecayCurve::from_config(&config.decay),
            summarize_threshold_tokens: config.summarize_threshold_tokens,
            max_summary_tokens: config.max_summary_tokens,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Rewrite the durable file from the current state
    ///
    /// Used at startup to prove the store location is writable.
    pub async fn flush(&self) -> Result<(), MemoryError> {
        let _writer = self.writer.lock().await;
        let bytes = {
            let records = self.records.read().await;
            self.file.encode(records.iter())?
        };
        self.file.write(&bytes).await
    }

    /// Validate and durably append an entry
    pub async fn append(&self, entry: MemoryEntry) -> Result<Uuid, MemoryError> {
        entry.validate()?;
        let id = entry.id();
        let record = MemoryRecord::active(entry);

        let _writer = self.writer.lock().await;
        let bytes = {
            let records = self.records.read().await;
            self.file
                .encode(records.iter().chain(std::iter::once(&record)))?
        };
        self.file.write(&bytes).await?;
        self.records.write().await.push(record);

        debug!(%id, "Appended memory entry");
        Ok(id)
    }

    /// Active entries by descending score that fit within `budget` tokens
    pub async fn retrieve(&self, budget: usize) -> Retrieval {
        self.retrieve_at(budget, Utc::now()).await
    }

    /// [`retrieve`](Self::retrieve) with an explicit clock
    pub async fn retrieve_at(&self, budget: usize, now: DateTime<Utc>) -> Retrieval {
        let ranked = self.ranked(now, |_| true).await;
        Retrieval {
            ranked: ranked.into_iter(),
            budget,
            used: 0,
        }
    }

    /// Active entries, most recent first
    pub async fn recent(&self, limit: usize) -> Vec<MemoryEntry> {
        let records = self.records.read().await;
        let mut active: Vec<(usize, &MemoryRecord)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_active())
            .collect();
        active.sort_by(|(ia, a), (ib, b)| {
            b.entry
                .timestamp()
                .cmp(&a.entry.timestamp())
                .then_with(|| ib.cmp(ia))
        });
        active
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.entry.clone())
            .collect()
    }

    /// Every record ever stored, archived included, in insertion order
    pub async fn history(&self) -> Vec<MemoryRecord> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<MemoryRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.entry.id() == id)
            .cloned()
    }

    /// Case-insensitive substring search over active entries, best score first
    pub async fn search(&self, query: &str, limit: usize) -> Vec<ScoredEntry> {
        let needle = query.to_lowercase();
        let mut ranked = self
            .ranked(Utc::now(), |entry| {
                entry.content().to_lowercase().contains(&needle)
            })
            .await;
        ranked.truncate(limit);
        ranked
    }

    /// Total token estimate of active entries
    pub async fn active_tokens(&self) -> usize {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.entry.token_estimate())
            .sum()
    }

    pub async fn stats(&self) -> MemoryStats {
        let records = self.records.read().await;
        let mut by_kind = BTreeMap::new();
        let mut active = 0;
        let mut active_tokens = 0;
        let mut importance_sum = 0.0_f64;

        for record in records.iter().filter(|r| r.is_active()) {
            active += 1;
            active_tokens += record.entry.token_estimate();
            importance_sum += f64::from(record.entry.importance());
            *by_kind.entry(record.entry.kind()).or_insert(0) += 1;
        }

        MemoryStats {
            total: records.len(),
            active,
            archived: records.len() - active,
            by_kind,
            active_tokens,
            average_importance: if active > 0 {
                importance_sum / active as f64
            } else {
                0.0
            },
            oldest: records.iter().map(|r| r.entry.timestamp()).min(),
            newest: records.iter().map(|r| r.entry.timestamp()).max(),
        }
    }

    /// Condense the oldest active entries when active content exceeds the ceiling
    ///
    /// Calling this again without new growth is a no-op.
    pub async fn summarize_if_needed(
        &self,
        provider: &LlmProvider,
    ) -> Result<SummarizeOutcome, MemoryError> {
        self.summarize(provider, false).await
    }

    /// Run a summarization pass regardless of the ceiling
    pub async fn force_summarize(
        &self,
        provider: &LlmProvider,
    ) -> Result<SummarizeOutcome, MemoryError> {
        self.summarize(provider, true).await
    }

    async fn summarize(
        &self,
        provider: &LlmProvider,
        force: bool,
    ) -> Result<SummarizeOutcome, MemoryError> {
        let (block, tokens_before) = {
            let records = self.records.read().await;
            let tokens_before: usize = records
                .iter()
                .filter(|r| r.is_active())
                .map(|r| r.entry.token_estimate())
                .sum();
            if !force && tokens_before <= self.summarize_threshold_tokens {
                return Ok(SummarizeOutcome::NotNeeded);
            }

            let candidates: Vec<&MemoryEntry> = records
                .iter()
                .filter(|r| r.is_active() && r.entry.kind() != MemoryKind::Summary)
                .map(|r| &r.entry)
                .collect();
            if candidates.len() < 2 {
                return Ok(SummarizeOutcome::Skipped {
                    reason: format!(
                        "{} unsummarized entries available, need at least 2",
                        candidates.len()
                    ),
                });
            }

            // Consumed tokens must leave room for the summary itself under the ceiling
            let target = (tokens_before + self.max_summary_tokens + 1)
                .saturating_sub(self.summarize_threshold_tokens);
            let min_entries = if force {
                (candidates.len() / 2).max(2)
            } else {
                2
            };

            let mut consumed_tokens = 0;
            let mut block = Vec::new();
            for entry in candidates {
                if consumed_tokens >= target && block.len() >= min_entries {
                    break;
                }
                consumed_tokens += entry.token_estimate();
                block.push(entry.clone());
            }
            (block, tokens_before)
        };

        let memories = block
            .iter()
            .map(|e| {
                format!(
                    "- [{}] ({}) {}",
                    e.timestamp().format("%Y-%m-%d %H:%M"),
                    e.kind(),
                    e.content()
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = SUMMARY_PROMPT
            .replace("{max_tokens}", &self.max_summary_tokens.to_string())
            .replace("{memories}", &memories);
        let options = GenerateOptions {
            max_tokens: Some(u32::try_from(self.max_summary_tokens).unwrap_or(u32::MAX)),
            temperature: Some(0.3),
            system: None,
        };

        // No lock is held across the provider call
        let generation = match provider.generate(&prompt, &options).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!("Summarization skipped, provider failed: {}", e);
                return Ok(SummarizeOutcome::Skipped {
                    reason: e.to_string(),
                });
            }
        };

        let text: String = generation
            .text
            .trim()
            .chars()
            .take(self.max_summary_tokens * 4)
            .collect();
        if text.trim().is_empty() {
            return Ok(SummarizeOutcome::Skipped {
                reason: "provider returned an empty summary".to_string(),
            });
        }

        let importance = block
            .iter()
            .map(|e| e.importance())
            .fold(0.0_f32, f32::max);
        let newest = block
            .iter()
            .map(|e| e.timestamp())
            .max()
            .unwrap_or_else(Utc::now);
        let oldest = block
            .iter()
            .map(|e| e.timestamp())
            .min()
            .unwrap_or(newest);
        let summary = MemoryEntry::new(MemoryKind::Summary, text)
            .with_importance(importance)
            .with_timestamp(newest)
            .with_metadata("summarized_count", block.len())
            .with_metadata("covers_from", oldest.to_rfc3339())
            .with_metadata("covers_to", newest.to_rfc3339())
            .with_metadata("backend", generation.backend.as_str());
        summary.validate()?;
        let summary_id = summary.id();
        let consumed_ids: HashSet<Uuid> = block.iter().map(|e| e.id()).collect();

        let _writer = self.writer.lock().await;
        let mut next = self.records.read().await.clone();
        let still_active = next
            .iter()
            .filter(|r| r.is_active() && consumed_ids.contains(&r.entry.id()))
            .count();
        if still_active != consumed_ids.len() {
            return Ok(SummarizeOutcome::Skipped {
                reason: "store changed during summarization".to_string(),
            });
        }

        let archived_at = Utc::now();
        for record in next
            .iter_mut()
            .filter(|r| consumed_ids.contains(&r.entry.id()))
        {
            record.archive(summary_id, archived_at);
        }
        next.push(MemoryRecord::active(summary));

        let bytes = self.file.encode(next.iter())?;
        self.file.write(&bytes).await?;

        let tokens_after = next
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.entry.token_estimate())
            .sum();
        *self.records.write().await = next;

        info!(
            consumed = consumed_ids.len(),
            tokens_before, tokens_after, "Summarized memory block"
        );
        Ok(SummarizeOutcome::Summarized {
            summary_id,
            consumed: consumed_ids.len(),
            tokens_before,
            tokens_after,
        })
    }

    /// Active entries matching `filter`, ordered by score, then recency, then insertion
    async fn ranked<F>(&self, now: DateTime<Utc>, filter: F) -> Vec<ScoredEntry>
    where
        F: Fn(&MemoryEntry) -> bool,
    {
        let records = self.records.read().await;
        let mut scored: Vec<(usize, ScoredEntry)> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_active() && filter(&r.entry))
            .map(|(index, r)| {
                let score = self
                    .decay
                    .score(r.entry.importance(), r.entry.timestamp(), now);
                (
                    index,
                    ScoredEntry {
                        entry: r.entry.clone(),
                        score,
                    },
                )
            })
            .collect();
        drop(records);

        scored.sort_by(|(ia, a), (ib, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.entry.timestamp().cmp(&a.entry.timestamp()))
                .then_with(|| ib.cmp(ia))
        });
        scored.into_iter().map(|(_, s)| s).collect()
    }
}
