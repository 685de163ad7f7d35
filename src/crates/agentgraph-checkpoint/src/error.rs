//! Error types for checkpoint storage backends

use thiserror::Error;

/// Result type alias for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors surfaced by checkpoint storage backends
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Backend storage failed (connection, query, disk)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Checkpoint payload could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested thread has no checkpoint history
    #[error("No checkpoint for thread '{0}'")]
    ThreadNotFound(String),
}
