//! Mindloop - autonomous agent loop with durable memory
//!
//! The crate wires four cooperating components into an observe, think, act and
//! learn cycle:
//! - [`memory`]: durable entry store with importance-weighted retrieval and
//!   summarization under a token ceiling
//! - [`reasoning`]: prompt construction and resilient decision parsing
//! - [`actions`]: registry of asynchronous handlers with timeouts
//! - [`provider`]: multi-backend LLM access with retry and failover
//!
//! [`agent`] drives the loop and owns lifecycle concerns.

pub mod actions;
pub mod agent;
pub mod channel;
pub mod config;
pub mod error;
pub mod memory;
pub mod provider;
pub mod reasoning;
pub mod testing;

pub use error::{MindloopError, Result};
