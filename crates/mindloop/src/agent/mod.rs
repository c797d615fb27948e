//! Orchestrator
//!
//! Drives the agent loop: drain operator messages, retrieve memories, decide,
//! act, record the outcome and summarize when the store grows too large.

pub mod commands;
pub mod orchestrator;
pub mod state;

pub use commands::{HELP_TEXT, InboundCommand, parse_inbound};
pub use orchestrator::{Agent, CycleReport};
pub use state::{AgentState, format_uptime};
