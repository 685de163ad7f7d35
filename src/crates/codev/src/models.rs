//! Session surface DTOs
//!
//! Shapes exchanged with the (out-of-scope) HTTP layer: session responses,
//! interrupt payloads and the summary view. The HTTP server serializes
//! these verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session status surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    PendingInterrupt,
    Completed,
    Error,
}

/// The five human-in-the-loop interrupt types, in the order they can occur
/// within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptType {
    Clarification,
    TargetSelect,
    CredentialCheck,
    PlanApproval,
    ResultReview,
}

impl InterruptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clarification => "clarification",
            Self::TargetSelect => "target_select",
            Self::CredentialCheck => "credential_check",
            Self::PlanApproval => "plan_approval",
            Self::ResultReview => "result_review",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "clarification" => Some(Self::Clarification),
            "target_select" => Some(Self::TargetSelect),
            "credential_check" => Some(Self::CredentialCheck),
            "plan_approval" => Some(Self::PlanApproval),
            "result_review" => Some(Self::ResultReview),
            _ => None,
        }
    }
}

/// Interrupt surfaced in a session response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptView {
    #[serde(rename = "type")]
    pub interrupt_type: InterruptType,
    pub payload: Value,
}

/// Response returned by every session operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub thread_id: String,
    pub status: SessionStatus,
    pub iteration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<InterruptView>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub runtime_mode: String,
    /// Populated when `status == Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// Candidate offered by the target-select interrupt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetCandidate {
    pub id: String,
    pub name: String,
}

/// Compact digest of a session for the summary endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub thread_id: String,
    pub status: SessionStatus,
    pub requirement: String,
    pub intent: Option<String>,
    pub target_graph_id: Option<String>,
    pub iteration: u32,
    pub verdict_status: Option<String>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub phase_count: usize,
}
