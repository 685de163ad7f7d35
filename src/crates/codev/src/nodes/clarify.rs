//! Clarify node: self-assessed ambiguity with an optional interrupt
//!
//! The model scores the requirement's ambiguity 0..10. At 5 or above (and
//! with the skip flag unset) the session suspends with two or three
//! targeted questions; otherwise it proceeds with `clarification = null`.

use super::{usage_update, AgentContext};
use crate::contracts::parse_ambiguity;
use crate::error::Result;
use crate::state::SessionState;
use crate::telemetry::PhaseTimer;
use agentgraph_core::graph::{NodeOutcome, RunContext};
use agentgraph_core::InterruptRequest;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

const CLARIFY_SYSTEM_PROMPT: &str = "\
Assess how ambiguous this graph-building requirement is on an integer \
scale 0..10 (0 = fully specified, 10 = hopelessly vague). If the score is \
5 or higher, ask 2-3 targeted questions whose answers would let an \
engineer proceed. Answer with exactly:\n\
SCORE: <0..10>\n\
QUESTIONS:\n\
- <question>\n\
- <question>";

pub async fn clarify(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    if ctx.config.skip_clarification {
        debug!(thread_id = %state.thread_id, "Clarification skipped by flag");
        return Ok(NodeOutcome::advance(json!({"clarification": Value::Null})));
    }

    let mut timer = PhaseTimer::start("clarify");
    let mut prompt = format!("Requirement: {}", state.requirement);
    if let Some(summary) = state
        .facts
        .get("flowise")
        .and_then(|f| f["current_flow_summary"].as_str())
    {
        prompt.push_str(&format!("\nExisting graph: {}", summary));
    }

    let response = ctx.chat(CLARIFY_SYSTEM_PROMPT, prompt).await?;
    let (input_tokens, output_tokens) = usage_update(&response);
    timer.add_tokens(input_tokens, output_tokens);

    let assessment = parse_ambiguity(response.text())?;
    info!(
        thread_id = %state.thread_id,
        score = assessment.score,
        "Ambiguity assessed"
    );

    let accounting = json!({
        "total_input_tokens": input_tokens,
        "total_output_tokens": output_tokens,
        "phase_metrics": [timer.finish()],
    });

    if assessment.score >= 5 {
        let mut update = accounting;
        update["clarification"] = Value::Null;
        Ok(NodeOutcome::interrupt(
            update,
            InterruptRequest::new(
                "clarification",
                json!({
                    "type": "clarification",
                    "questions": assessment.questions,
                    "score": assessment.score,
                }),
                "clarification",
                "discover",
            ),
        ))
    } else {
        let mut update = accounting;
        update["clarification"] = Value::Null;
        Ok(NodeOutcome::advance(update))
    }
}
