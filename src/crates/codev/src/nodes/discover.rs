//! Discover phase: fan out over domain capabilities, then gate on
//! credentials
//!
//! Each registered capability contributes a distilled summary plus
//! structured facts; raw tool payloads land in the prompt-invisible debug
//! channel. The summary is the only conduit from tools to downstream
//! prompts.

use super::AgentContext;
use crate::capability::DiscoverContext;
use crate::contracts::parse_credentials_status;
use crate::error::Result;
use crate::state::SessionState;
use crate::telemetry::PhaseTimer;
use agentgraph_core::graph::{NodeOutcome, RunContext};
use agentgraph_core::InterruptRequest;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

pub async fn discover(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("discover");

    let discover_ctx = DiscoverContext {
        requirement: &state.requirement,
        clarification: state.clarification.as_deref(),
        intent: state.intent,
        base_graph: state.base_graph.as_ref(),
    };

    let mut summaries = Vec::new();
    let mut facts = Map::new();
    let mut artifacts = Map::new();
    let mut debug = Map::new();
    let mut input_tokens = 0u64;
    let mut output_tokens = 0u64;

    for capability in &ctx.capabilities {
        let output = capability.discover(&discover_ctx).await?;
        timer.add_tool_calls(output.tool_calls, output.cache_hits);
        timer.add_tokens(output.input_tokens, output.output_tokens);
        input_tokens += output.input_tokens;
        output_tokens += output.output_tokens;

        summaries.push(output.summary);
        facts.insert(capability.domain().to_string(), output.facts);
        artifacts.insert(capability.domain().to_string(), output.artifacts);
        debug.insert(capability.domain().to_string(), output.debug);
    }

    let discovery_summary = summaries.join("\n\n");
    info!(
        thread_id = %state.thread_id,
        domains = ctx.capabilities.len(),
        "Discovery complete"
    );

    Ok(NodeOutcome::advance(json!({
        "discovery_summary": discovery_summary,
        "facts": facts,
        "artifacts": artifacts,
        "debug": debug,
        "total_input_tokens": input_tokens,
        "total_output_tokens": output_tokens,
        "phase_metrics": [timer.finish()],
    })))
}

/// Gate on the structured credential block in the discovery summary.
pub async fn check_credentials(
    _ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let status = parse_credentials_status(&state.discovery_summary);

    if status.missing {
        info!(
            thread_id = %state.thread_id,
            missing = ?status.missing_types,
            "Missing credentials; suspending"
        );
        return Ok(NodeOutcome::interrupt(
            json!({}),
            InterruptRequest::new(
                "credential_check",
                json!({
                    "type": "credential_check",
                    "missing_types": status.missing_types,
                }),
                "credential_ack",
                "plan_v2",
            ),
        ));
    }

    Ok(NodeOutcome::advance(json!({"credential_ack": Value::Null})))
}
