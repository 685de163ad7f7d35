//! Intent phase: classify the requirement, warm the knowledge layer

use super::{usage_update, AgentContext};
use crate::contracts::parse_intent;
use crate::error::Result;
use crate::state::SessionState;
use crate::telemetry::PhaseTimer;
use agentgraph_core::graph::{NodeOutcome, RunContext};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const CLASSIFY_SYSTEM_PROMPT: &str = "\
Classify a graph-building requirement. Answer with exactly:\n\
INTENT: CREATE or UPDATE\n\
TARGET: the name of the existing graph to modify, or none\n\
UPDATE means the requirement refers to changing an existing graph; \
CREATE means building a new one.";

/// Decide CREATE vs UPDATE and extract the target graph name, if any.
pub async fn classify_intent(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("classify_intent");

    let response = ctx
        .chat(CLASSIFY_SYSTEM_PROMPT, state.requirement.clone())
        .await?;
    let (input_tokens, output_tokens) = usage_update(&response);
    timer.add_tokens(input_tokens, output_tokens);

    let (intent, target) = parse_intent(response.text())?;
    info!(thread_id = %state.thread_id, intent = %intent, "Classified intent");

    Ok(NodeOutcome::advance(json!({
        "intent": intent,
        "facts": {"resolve": {"target_query": target}},
        "messages": [agentgraph_core::Message::assistant(response.text()).with_name("classify_intent")],
        "total_input_tokens": input_tokens,
        "total_output_tokens": output_tokens,
        "phase_metrics": [timer.finish()],
    })))
}

/// Warm the session with knowledge-layer facts; no LLM, no platform I/O.
pub async fn hydrate_context(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let fingerprint = ctx.schema_store.fingerprint();
    info!(
        thread_id = %state.thread_id,
        node_count = ctx.schema_store.node_count(),
        "Hydrated knowledge context"
    );

    Ok(NodeOutcome::advance(json!({
        "facts": {
            "schema": {
                "fingerprint": fingerprint,
                "node_count": ctx.schema_store.node_count(),
            }
        },
    })))
}
