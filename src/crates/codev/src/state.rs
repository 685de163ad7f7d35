//! Durable per-session state
//!
//! The engine holds session state as a JSON object; [`SessionState`] is the
//! typed view nodes deserialize at entry. Updates are written back as
//! partial JSON objects, so accumulator fields (transcript, metrics, token
//! counters, per-domain maps) can be expressed as small deltas folded in by
//! the reducer schema from [`channel_schema`].

use crate::contracts::{ConvergeVerdict, PlanContract, TestResult, TestSuite};
use crate::error::Result;
use crate::ir::Op;
use crate::telemetry::PhaseMetrics;
use agentgraph_core::state::{AppendReducer, MergeReducer, StateSchema, SumReducer};
use agentgraph_core::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Operation mode, fixed by intent classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    Create,
    Update,
}

/// Terminal error record written into state by a failing node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub detail: String,
}

/// Typed view over the session state object.
///
/// Every field defaults so partially-populated states (early nodes, old
/// checkpoints) deserialize cleanly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub requirement: String,
    #[serde(default)]
    pub clarification: Option<String>,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub target_graph_id: Option<String>,
    #[serde(default)]
    pub base_graph: Option<Value>,

    /// Distilled facts for downstream prompts; never raw tool payloads
    #[serde(default)]
    pub discovery_summary: String,
    /// Structured facts per domain, merged per-key
    #[serde(default)]
    pub facts: Map<String, Value>,
    /// Compile-time seeds (pattern-sourced base graph, etc.), per domain
    #[serde(default)]
    pub artifacts: Map<String, Value>,
    /// Raw tool payloads and metrics; prompt-invisible
    #[serde(default)]
    pub debug: Map<String, Value>,

    #[serde(default)]
    pub plan_text: String,
    #[serde(default)]
    pub plan_contract: Option<PlanContract>,
    #[serde(default)]
    pub patch_ops: Vec<Op>,
    #[serde(default)]
    pub compiled_graph: Option<Value>,
    #[serde(default)]
    pub payload_hash: Option<String>,
    #[serde(default)]
    pub validated_hash: Option<String>,

    #[serde(default)]
    pub test_suite: Option<TestSuite>,
    #[serde(default)]
    pub test_results: Vec<TestResult>,
    #[serde(default)]
    pub verdict: Option<ConvergeVerdict>,
    #[serde(default)]
    pub iteration: u32,

    #[serde(default)]
    pub total_input_tokens: u64,
    #[serde(default)]
    pub total_output_tokens: u64,
    #[serde(default)]
    pub phase_metrics: Vec<PhaseMetrics>,

    #[serde(default)]
    pub runtime_mode: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Schema-snapshot fingerprint recorded at the last compile
    #[serde(default)]
    pub schema_fingerprint: Option<String>,

    // Interrupt response landing fields. Each human response is injected
    // into exactly one of these by `resume`.
    #[serde(default)]
    pub plan_approval_response: Option<String>,
    #[serde(default)]
    pub review_response: Option<String>,
    #[serde(default)]
    pub credential_ack: Option<String>,

    /// Bounded schema-repair bookkeeping
    #[serde(default)]
    pub schema_repair_attempted: bool,
    /// Missing node_type that triggered the repair path
    #[serde(default)]
    pub schema_repair_target: Option<String>,

    /// Routing hint written by validate/preflight/apply for conditional edges
    #[serde(default)]
    pub route_hint: Option<String>,

    /// Terminal error record; presence means the session failed
    #[serde(default)]
    pub error: Option<ErrorRecord>,
}

impl SessionState {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Initial state for a new session. The transcript opens with the
    /// human requirement.
    pub fn initial(
        thread_id: impl Into<String>,
        requirement: impl Into<String>,
        runtime_mode: &str,
        webhook_url: Option<String>,
    ) -> Value {
        let requirement = requirement.into();
        let opening = Message::human(requirement.clone());
        serde_json::json!({
            "thread_id": thread_id.into(),
            "requirement": requirement,
            "runtime_mode": runtime_mode,
            "webhook_url": webhook_url,
            "iteration": 0,
            "total_input_tokens": 0,
            "total_output_tokens": 0,
            "messages": [opening],
            "phase_metrics": [],
            "facts": {},
            "artifacts": {},
            "debug": {},
        })
    }
}

/// Reducer schema for the session state channels.
///
/// Accumulators append or sum; per-domain maps merge per key; everything
/// else overwrites.
pub fn channel_schema() -> StateSchema {
    StateSchema::new()
        .with_field("messages", Box::new(AppendReducer))
        .with_field("phase_metrics", Box::new(AppendReducer))
        .with_field("total_input_tokens", Box::new(SumReducer))
        .with_field("total_output_tokens", Box::new(SumReducer))
        .with_field("facts", Box::new(MergeReducer))
        .with_field("artifacts", Box::new(MergeReducer))
        .with_field("debug", Box::new(MergeReducer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initial_state_deserializes() {
        let value = SessionState::initial("t-1", "build a bot", "capability_first", None);
        let state = SessionState::from_value(&value).unwrap();
        assert_eq!(state.thread_id, "t-1");
        assert_eq!(state.requirement, "build a bot");
        assert_eq!(state.iteration, 0);
        assert!(state.intent.is_none());
        assert!(state.error.is_none());
    }

    #[test]
    fn channel_schema_accumulates() {
        let schema = channel_schema();
        let mut state = SessionState::initial("t", "r", "capability_first", None);

        schema
            .apply(
                &mut state,
                &json!({
                    "total_input_tokens": 120,
                    "facts": {"flowise": {"node_count": 3}},
                    "messages": [{"role": "assistant", "content": "plan"}],
                }),
            )
            .unwrap();
        schema
            .apply(
                &mut state,
                &json!({
                    "total_input_tokens": 30,
                    "facts": {"schema": {"fingerprint": "abc"}},
                    "messages": [{"role": "human", "content": "ok"}],
                }),
            )
            .unwrap();

        assert_eq!(state["total_input_tokens"], json!(150));
        assert_eq!(state["facts"]["flowise"]["node_count"], json!(3));
        assert_eq!(state["facts"]["schema"]["fingerprint"], json!("abc"));
        // the opening requirement message plus the two appended above
        assert_eq!(state["messages"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn intent_serializes_uppercase() {
        assert_eq!(serde_json::to_value(Intent::Create).unwrap(), json!("CREATE"));
        assert_eq!(serde_json::to_value(Intent::Update).unwrap(), json!("UPDATE"));
    }
}
