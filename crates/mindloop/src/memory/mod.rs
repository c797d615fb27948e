//! Memory engine
//!
//! Durable, append-only store of [`MemoryEntry`] values with importance-weighted
//! retrieval and summarization under a token ceiling.

pub mod decay;
pub mod engine;
pub mod store;
pub mod types;

pub use decay::DecayCurve;
pub use engine::{MemoryEngine, MemoryStats, Retrieval, SummarizeOutcome};
pub use store::{MemoryFile, write_atomic};
pub use types::{
    MemoryEntry, MemoryError, MemoryKind, MemoryRecord, MetadataValue, ScoredEntry,
    estimate_tokens,
};
