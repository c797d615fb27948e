//! Error types for Mindloop

use thiserror::Error;

use crate::memory::MemoryError;
use crate::provider::ProviderError;

/// Main error type for Mindloop operations
#[derive(Error, Debug)]
pub enum MindloopError {
    /// Configuration errors (unreadable file, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Durable storage errors outside the memory append path (state file, data dir)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Memory engine errors
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Provider errors that escaped the failover chain
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl From<serde_json::Error> for MindloopError {
    fn from(e: serde_json::Error) -> Self {
        MindloopError::Serialization(e.to_string())
    }
}

/// Result type alias for Mindloop operations
pub type Result<T> = std::result::Result<T, MindloopError>;
