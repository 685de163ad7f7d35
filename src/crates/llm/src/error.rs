//! Provider error taxonomy

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LlmError {
    /// Transient conditions the graph runner may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::HttpError(_)
                | LlmError::RateLimitExceeded(_)
                | LlmError::ServiceUnavailable(_)
        )
    }

    /// Convert into the engine error type, preserving retriability.
    pub fn into_graph_error(self, node: &str) -> agentgraph_core::GraphError {
        if self.is_retryable() {
            agentgraph_core::GraphError::retriable(node, self.to_string())
        } else {
            agentgraph_core::GraphError::Llm(self.to_string())
        }
    }
}

impl From<LlmError> for agentgraph_core::GraphError {
    fn from(err: LlmError) -> Self {
        err.into_graph_error("llm")
    }
}
