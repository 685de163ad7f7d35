//! Environment-driven agent configuration
//!
//! All knobs come from environment variables with documented defaults;
//! there are no config files. `AgentConfig::from_env` is called once at
//! startup and the result is shared immutably across sessions.

use crate::error::{CodevError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Reasoning engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningEngine {
    Claude,
    OpenAi,
}

impl ReasoningEngine {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "openai" => Ok(Self::OpenAi),
            other => Err(CodevError::Config(format!(
                "REASONING_ENGINE must be 'claude' or 'openai', got '{}'",
                other
            ))),
        }
    }
}

/// Behavior when the node-schema snapshot fingerprint changes mid-session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftPolicy {
    /// Log and proceed
    Warn,
    /// Transition the session to a terminal error state
    Fail,
    /// Re-index the snapshot and proceed
    Refresh,
}

impl DriftPolicy {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "fail" => Ok(Self::Fail),
            "refresh" => Ok(Self::Refresh),
            other => Err(CodevError::Config(format!(
                "FLOWISE_SCHEMA_DRIFT_POLICY must be warn, fail or refresh, got '{}'",
                other
            ))),
        }
    }
}

/// Fixed at session creation; selects the op-emission path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeMode {
    #[default]
    CapabilityFirst,
    CompatLegacy,
}

impl RuntimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapabilityFirst => "capability_first",
            Self::CompatLegacy => "compat_legacy",
        }
    }
}

/// Agent-wide configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Flowise platform base URL
    pub flowise_endpoint: String,
    /// Flowise API key
    pub flowise_api_key: String,
    /// Key callers present to the session surface (collaborator concern)
    pub agent_api_key: Option<String>,

    pub reasoning_engine: ReasoningEngine,
    pub reasoning_model: String,
    pub reasoning_temperature: f32,

    /// Suppress the clarification interrupt regardless of ambiguity score
    pub skip_clarification: bool,
    /// TTL for the discover-phase tool cache; zero disables caching
    pub discover_cache_ttl: Duration,
    pub runtime_mode: RuntimeMode,
    pub drift_policy: DriftPolicy,
    pub rate_limit_sessions_per_min: u32,

    /// Hard cap on ITERATE cycles per session
    pub max_iterations: u32,
    /// Combined input+output token ceiling per session
    pub token_ceiling: u64,
    /// Per-call tool timeout
    pub tool_timeout: Duration,

    pub schema_snapshot_path: PathBuf,
    pub credential_snapshot_path: PathBuf,
    pub pattern_db_path: PathBuf,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let flowise_endpoint = require_var("FLOWISE_API_ENDPOINT")?;
        let flowise_api_key = require_var("FLOWISE_API_KEY")?;

        let reasoning_engine =
            ReasoningEngine::parse(&var_or("REASONING_ENGINE", "claude"))?;
        let reasoning_model = var_or(
            "REASONING_MODEL",
            match reasoning_engine {
                ReasoningEngine::Claude => "claude-sonnet-4-20250514",
                ReasoningEngine::OpenAi => "gpt-4o",
            },
        );
        let reasoning_temperature = parse_var("REASONING_TEMPERATURE", 0.2)?;

        let drift_policy = DriftPolicy::parse(&var_or("FLOWISE_SCHEMA_DRIFT_POLICY", "warn"))?;
        let runtime_mode = if flag("FLOWISE_COMPAT_LEGACY") {
            RuntimeMode::CompatLegacy
        } else {
            RuntimeMode::CapabilityFirst
        };

        Ok(Self {
            flowise_endpoint,
            flowise_api_key,
            agent_api_key: std::env::var("AGENT_API_KEY").ok(),
            reasoning_engine,
            reasoning_model,
            reasoning_temperature,
            skip_clarification: flag("SKIP_CLARIFICATION"),
            discover_cache_ttl: Duration::from_secs(parse_var("DISCOVER_CACHE_TTL_SECS", 300u64)?),
            runtime_mode,
            drift_policy,
            rate_limit_sessions_per_min: parse_var("RATE_LIMIT_SESSIONS_PER_MIN", 10u32)?,
            max_iterations: parse_var("MAX_ITERATIONS", 10u32)?,
            token_ceiling: parse_var("TOKEN_CEILING", 2_000_000u64)?,
            tool_timeout: Duration::from_secs(parse_var("TOOL_TIMEOUT_SECS", 120u64)?),
            schema_snapshot_path: PathBuf::from(var_or(
                "FLOWISE_SCHEMA_SNAPSHOT",
                "schemas/flowise_nodes.snapshot.json",
            )),
            credential_snapshot_path: PathBuf::from(var_or(
                "FLOWISE_CREDENTIAL_SNAPSHOT",
                "schemas/flowise_credentials.snapshot.json",
            )),
            pattern_db_path: PathBuf::from(var_or("PATTERN_DB_PATH", "data/patterns.db")),
        })
    }

    /// Defaults suitable for tests: no platform endpoint required.
    pub fn for_tests() -> Self {
        Self {
            flowise_endpoint: "http://localhost:3000".to_string(),
            flowise_api_key: "test-key".to_string(),
            agent_api_key: None,
            reasoning_engine: ReasoningEngine::Claude,
            reasoning_model: "test-model".to_string(),
            reasoning_temperature: 0.2,
            skip_clarification: false,
            discover_cache_ttl: Duration::from_secs(300),
            runtime_mode: RuntimeMode::CapabilityFirst,
            drift_policy: DriftPolicy::Warn,
            rate_limit_sessions_per_min: 10,
            max_iterations: 10,
            token_ceiling: 2_000_000,
            tool_timeout: Duration::from_secs(120),
            schema_snapshot_path: PathBuf::from("schemas/flowise_nodes.snapshot.json"),
            credential_snapshot_path: PathBuf::from("schemas/flowise_credentials.snapshot.json"),
            pattern_db_path: PathBuf::from(":memory:"),
        }
    }
}

fn require_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| CodevError::Config(format!("{} must be set", name)))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CodevError::Config(format!("{} has invalid value '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_parsing_is_case_insensitive() {
        assert_eq!(
            ReasoningEngine::parse("Claude").unwrap(),
            ReasoningEngine::Claude
        );
        assert_eq!(
            ReasoningEngine::parse("OPENAI").unwrap(),
            ReasoningEngine::OpenAi
        );
        assert!(ReasoningEngine::parse("gemini").is_err());
    }

    #[test]
    fn drift_policy_rejects_unknown() {
        assert_eq!(DriftPolicy::parse("refresh").unwrap(), DriftPolicy::Refresh);
        assert!(DriftPolicy::parse("panic").is_err());
    }

    #[test]
    fn runtime_mode_labels() {
        assert_eq!(RuntimeMode::CapabilityFirst.as_str(), "capability_first");
        assert_eq!(RuntimeMode::CompatLegacy.as_str(), "compat_legacy");
    }
}
