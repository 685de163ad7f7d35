//! Error types for the codev agent
//!
//! Provides a unified error type whose variants map onto the agent's error
//! taxonomy. Internal helpers raise `CodevError`; node wrappers catch at a
//! single boundary and convert to either an iterate-verdict category or a
//! terminal error record, so the public contract of every node stays
//! "returns a next state".

use std::fmt;

/// Result type alias for codev operations
pub type Result<T> = std::result::Result<T, CodevError>;

/// Main error type for codev operations
#[derive(Debug)]
pub enum CodevError {
    /// Configuration error (bad or missing environment variable)
    Config(String),

    /// Missing or ambiguous credential binding
    Credential(String),

    /// Invalid graph structure, pre- or post-compile
    Structure(String),

    /// Tests ran but failed to satisfy success criteria
    Logic(String),

    /// Target graph not deployed or not the graph under edit
    Incomplete(String),

    /// UPDATE requested but no graph matched the requirement
    UnresolvedTarget(String),

    /// Node-schema snapshot changed mid-session under policy=fail
    SchemaDrift { fingerprint: String },

    /// Payload hash did not match the validated hash at apply time
    WriteGuardMismatch { expected: String, actual: String },

    /// A referenced node_type is missing from the schema registry; the
    /// orchestrator runs the scoped schema repair path
    SchemaMissing(String),

    /// Caller exceeded the session-creation rate limit
    RateLimit(String),

    /// Transient network or provider failure, subject to retry with backoff
    Retriable(String),

    /// Iteration or token budget reached
    Exhausted(String),

    /// Tool execution error
    ToolExecution(String),

    /// LLM produced output that could not be parsed into the expected form
    MalformedLlmOutput(String),

    /// Pattern store error
    PatternStore(String),

    /// IO error
    Io(std::io::Error),

    /// Serialization/deserialization error
    Serde(serde_json::Error),

    /// SQL error
    Sqlx(sqlx::Error),

    /// Any other uncaught condition
    Internal(String),
}

impl CodevError {
    /// Stable kind tag used in error records and session responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Credential(_) => "CREDENTIAL",
            Self::Structure(_) => "STRUCTURE",
            Self::Logic(_) => "LOGIC",
            Self::Incomplete(_) => "INCOMPLETE",
            Self::UnresolvedTarget(_) => "UNRESOLVED_TARGET",
            Self::SchemaDrift { .. } => "SCHEMA_DRIFT",
            Self::WriteGuardMismatch { .. } => "WRITE_GUARD_MISMATCH",
            Self::SchemaMissing(_) => "SCHEMA_MISSING",
            Self::RateLimit(_) => "RATE_LIMIT",
            Self::Retriable(_) => "RETRIABLE",
            Self::Exhausted(_) => "EXHAUSTED",
            Self::ToolExecution(_) => "TOOL_EXECUTION",
            Self::MalformedLlmOutput(_) => "MALFORMED_LLM_OUTPUT",
            Self::PatternStore(_) => "PATTERN_STORE",
            Self::Io(_) | Self::Serde(_) | Self::Sqlx(_) | Self::Internal(_) => "INTERNAL",
        }
    }

    /// True for transient failures the node runner retries with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }
}

impl fmt::Display for CodevError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Credential(msg) => write!(f, "Credential error: {}", msg),
            Self::Structure(msg) => write!(f, "Structure error: {}", msg),
            Self::Logic(msg) => write!(f, "Logic error: {}", msg),
            Self::Incomplete(msg) => write!(f, "Incomplete: {}", msg),
            Self::UnresolvedTarget(msg) => write!(f, "Unresolved target: {}", msg),
            Self::SchemaDrift { fingerprint } => {
                write!(f, "Schema drift detected, new fingerprint {}", fingerprint)
            }
            Self::WriteGuardMismatch { expected, actual } => write!(
                f,
                "Write guard mismatch: validated {} but payload is {}",
                expected, actual
            ),
            Self::SchemaMissing(node_type) => {
                write!(f, "Unknown node type '{}' in schema registry", node_type)
            }
            Self::RateLimit(msg) => write!(f, "Rate limit exceeded: {}", msg),
            Self::Retriable(msg) => write!(f, "Transient failure: {}", msg),
            Self::Exhausted(msg) => write!(f, "Budget exhausted: {}", msg),
            Self::ToolExecution(msg) => write!(f, "Tool execution error: {}", msg),
            Self::MalformedLlmOutput(msg) => write!(f, "Malformed LLM output: {}", msg),
            Self::PatternStore(msg) => write!(f, "Pattern store error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Serde(err) => write!(f, "Serialization error: {}", err),
            Self::Sqlx(err) => write!(f, "SQL error: {}", err),
            Self::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CodevError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Serde(err) => Some(err),
            Self::Sqlx(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CodevError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for CodevError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err)
    }
}

impl From<sqlx::Error> for CodevError {
    fn from(err: sqlx::Error) -> Self {
        Self::Sqlx(err)
    }
}

impl From<agentgraph_core::GraphError> for CodevError {
    fn from(err: agentgraph_core::GraphError) -> Self {
        if err.is_retriable() {
            Self::Retriable(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<agentgraph_checkpoint::CheckpointError> for CodevError {
    fn from(err: agentgraph_checkpoint::CheckpointError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(CodevError::Credential("x".into()).kind(), "CREDENTIAL");
        assert_eq!(
            CodevError::WriteGuardMismatch {
                expected: "a".into(),
                actual: "b".into()
            }
            .kind(),
            "WRITE_GUARD_MISMATCH"
        );
        assert_eq!(CodevError::Internal("x".into()).kind(), "INTERNAL");
    }

    #[test]
    fn only_retriable_is_retriable() {
        assert!(CodevError::Retriable("t".into()).is_retriable());
        assert!(!CodevError::Structure("s".into()).is_retriable());
    }
}
