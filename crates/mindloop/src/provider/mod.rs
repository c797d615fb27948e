//! LLM provider abstraction
//!
//! One `generate` call and one `test_connection` probe, uniform across
//! backend kinds, with retry and ordered failover handled by [`LlmProvider`].

pub mod backend;
pub mod backends;
pub mod chain;
pub mod types;

pub use backend::{Backend, build_backend};
pub use chain::LlmProvider;
pub use types::{
    BackendFailure, Completion, ConnectionReport, GenerateOptions, Generation, ProviderError,
    RetryPolicy, TokenUsage,
};
