//! Error types for graph construction and execution

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while building or executing a graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// Node implementation failed with a permanent error
    #[error("Node '{node}' failed: {error}")]
    NodeExecution { node: String, error: String },

    /// Node implementation failed with a transient error; the runner retries
    /// these with backoff before giving up
    #[error("Retriable failure in node '{node}': {error}")]
    Retriable { node: String, error: String },

    /// Graph structure is invalid (missing entry, dangling edge, ...)
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// An edge or router referenced a node that is not registered
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// State update could not be applied through the schema
    #[error("State error: {0}")]
    State(#[from] crate::state::StateError),

    /// Checkpoint backend failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] agentgraph_checkpoint::CheckpointError),

    /// Thread has no checkpoint history
    #[error("No checkpoint for thread '{0}'")]
    NoCheckpoint(String),

    /// `resume` called on a thread that is not suspended
    #[error("Thread '{0}' is not awaiting a response")]
    NotSuspended(String),

    /// Execution exceeded the configured step limit
    #[error("Step limit of {limit} reached in thread '{thread_id}'")]
    StepLimit { thread_id: String, limit: u64 },

    /// LLM provider failure surfaced through a node
    #[error("LLM error: {0}")]
    Llm(String),
}

impl GraphError {
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    pub fn retriable(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Retriable {
            node: node.into(),
            error: error.into(),
        }
    }

    /// True for transient failures subject to retry with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable { .. })
    }
}
