//! Checkpoint data model
//!
//! A [`Checkpoint`] captures everything a suspended session needs in order
//! to continue in a fresh process: the state object itself, the next node to
//! run, and the pending interrupt (if control was handed back to a human).
//! Resumption never relies on in-process memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A human-in-the-loop suspension recorded inside a checkpoint.
///
/// `kind` is the interrupt type tag (e.g. `"plan_approval"`), `payload` is
/// the context shown to the human, `resume_key` names the state field the
/// response is written into, and `resume_to` is the node that consumes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingInterrupt {
    /// Node that raised the interrupt
    pub node: String,
    /// Interrupt type tag
    pub kind: String,
    /// Context payload presented to the caller
    pub payload: Value,
    /// State field the resume response is injected into
    pub resume_key: String,
    /// Node executed after the response is injected
    pub resume_to: String,
    /// When the interrupt was raised
    pub raised_at: DateTime<Utc>,
}

/// Execution metadata recorded alongside each checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// Node whose execution produced this checkpoint
    pub node: Option<String>,
    /// Source of the checkpoint: "input", "loop" or "resume"
    pub source: String,
}

impl CheckpointMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            node: None,
            source: source.into(),
        }
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

/// A complete snapshot of a session at one point in its execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Full state object (opaque to the storage backend)
    pub state: Value,
    /// Node to execute next; `None` means the session has ended
    pub next_node: Option<String>,
    /// Interrupt awaiting a human response, if any
    pub pending_interrupt: Option<PendingInterrupt>,
    /// Monotonic step counter, incremented per node execution
    pub step: u64,
    /// Execution metadata
    pub metadata: CheckpointMetadata,
    /// When this checkpoint was written
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Checkpoint for a freshly created session about to run `entry`.
    pub fn initial(state: Value, entry: impl Into<String>) -> Self {
        Self {
            state,
            next_node: Some(entry.into()),
            pending_interrupt: None,
            step: 0,
            metadata: CheckpointMetadata::new("input"),
            created_at: Utc::now(),
        }
    }

    /// True when the session is suspended waiting for a human response.
    pub fn is_suspended(&self) -> bool {
        self.pending_interrupt.is_some()
    }

    /// True when the session has run to completion.
    pub fn is_complete(&self) -> bool {
        self.next_node.is_none() && self.pending_interrupt.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initial_checkpoint_points_at_entry() {
        let cp = Checkpoint::initial(json!({"requirement": "build a bot"}), "classify_intent");
        assert_eq!(cp.next_node.as_deref(), Some("classify_intent"));
        assert_eq!(cp.step, 0);
        assert!(!cp.is_suspended());
        assert!(!cp.is_complete());
    }

    #[test]
    fn checkpoint_roundtrips_through_json() {
        let cp = Checkpoint {
            state: json!({"iteration": 2}),
            next_node: Some("plan_v2".to_string()),
            pending_interrupt: Some(PendingInterrupt {
                node: "hitl_plan_v2".to_string(),
                kind: "plan_approval".to_string(),
                payload: json!({"plan": "..."}),
                resume_key: "plan_approval_response".to_string(),
                resume_to: "define_scope".to_string(),
                raised_at: Utc::now(),
            }),
            step: 9,
            metadata: CheckpointMetadata::new("loop").with_node("hitl_plan_v2"),
            created_at: Utc::now(),
        };

        let encoded = serde_json::to_string(&cp).unwrap();
        let decoded: Checkpoint = serde_json::from_str(&encoded).unwrap();
        assert_eq!(cp, decoded);
        assert!(decoded.is_suspended());
    }
}
