//! Human-in-the-loop interrupt requests
//!
//! A node suspends the session by returning an [`InterruptRequest`]: a typed
//! payload for the caller plus resume bookkeeping (which state field the
//! human response lands in, and which node consumes it). The runner persists
//! the request into the checkpoint as a
//! [`PendingInterrupt`](agentgraph_checkpoint::PendingInterrupt) and unwinds
//! to the caller; `resume` injects the response and continues.

use agentgraph_checkpoint::PendingInterrupt;
use chrono::Utc;
use serde_json::Value;

/// A suspension raised by a node.
#[derive(Debug, Clone)]
pub struct InterruptRequest {
    /// Interrupt type tag, e.g. `"clarification"` or `"plan_approval"`
    pub kind: String,
    /// Context payload surfaced to the caller
    pub payload: Value,
    /// State field the response is written into on resume
    pub resume_key: String,
    /// Node executed after the response is injected
    pub resume_to: String,
}

impl InterruptRequest {
    pub fn new(
        kind: impl Into<String>,
        payload: Value,
        resume_key: impl Into<String>,
        resume_to: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            payload,
            resume_key: resume_key.into(),
            resume_to: resume_to.into(),
        }
    }

    /// Materialize into the checkpointed form, stamped with the raising node.
    pub fn into_pending(self, node: impl Into<String>) -> PendingInterrupt {
        PendingInterrupt {
            node: node.into(),
            kind: self.kind,
            payload: self.payload,
            resume_key: self.resume_key,
            resume_to: self.resume_to,
            raised_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pending_interrupt_carries_resume_bookkeeping() {
        let req = InterruptRequest::new(
            "clarification",
            json!({"questions": ["Which model?"], "score": 7}),
            "clarification",
            "discover",
        );
        let pending = req.into_pending("clarify");

        assert_eq!(pending.node, "clarify");
        assert_eq!(pending.kind, "clarification");
        assert_eq!(pending.resume_key, "clarification");
        assert_eq!(pending.resume_to, "discover");
        assert_eq!(pending.payload["score"], 7);
    }
}
