//! Reasoning engine
//!
//! Turns a goal, retrieved memories and the action catalog into a
//! [`Decision`], degrading to a safe fallback when the model answer is unusable.

pub mod engine;
pub mod parser;
pub mod prompts;

pub use engine::{
    DecisionOutcome, DecisionRequest, ParseOutcome, ReasoningCounts, ReasoningEngine,
    ReasoningStats,
};
pub use parser::{Decision, ReasoningParseError, parse_decision};
