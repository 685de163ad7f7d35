//! Resolve and load phases (UPDATE mode)
//!
//! `resolve_target` matches the requirement's target description against
//! the platform's graph listing: zero matches is a terminal
//! `UNRESOLVED_TARGET`, one match proceeds, several suspend on a
//! target-select interrupt. `load_current_flow` then pulls the chosen
//! graph as the compilation base.

use super::{fail, usage_update, AgentContext, ROUTE_LOAD, ROUTE_SELECT};
use crate::error::{CodevError, Result};
use crate::models::TargetCandidate;
use crate::state::SessionState;
use crate::telemetry::PhaseTimer;
use crate::tools::execute_tool;
use agentgraph_core::graph::{NodeOutcome, RunContext};
use agentgraph_core::InterruptRequest;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Match the target description against the platform graph listing.
pub async fn resolve_target(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("resolve_target");

    let (result, cached) = execute_tool(
        "flowise.list_graphs",
        json!({}),
        &ctx.registry,
        None,
        ctx.config.tool_timeout,
    )
    .await;
    timer.add_tool_calls(1, u32::from(cached));

    if !result.ok {
        return Err(CodevError::ToolExecution(
            result.error.unwrap_or_else(|| "graph listing failed".to_string()),
        ));
    }

    let query = state
        .facts
        .get("resolve")
        .and_then(|r| r["target_query"].as_str())
        .unwrap_or(&state.requirement)
        .to_ascii_lowercase();

    let candidates: Vec<TargetCandidate> = result
        .data
        .as_array()
        .map(|graphs| {
            graphs
                .iter()
                .filter_map(|g| {
                    let id = g["id"].as_str()?;
                    let name = g["name"].as_str()?;
                    let name_lower = name.to_ascii_lowercase();
                    let hit = query
                        .split_whitespace()
                        .any(|token| token.len() >= 3 && name_lower.contains(token));
                    hit.then(|| TargetCandidate {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    info!(
        thread_id = %state.thread_id,
        matches = candidates.len(),
        "Resolved update target"
    );

    match candidates.len() {
        0 => Ok(fail(
            "UNRESOLVED_TARGET",
            format!("no existing graph matches '{}'", query),
        )),
        1 => Ok(NodeOutcome::advance(json!({
            "target_graph_id": candidates[0].id,
            "route_hint": ROUTE_LOAD,
            "facts": {"resolve": {"target_query": query, "candidates": candidates}},
            "debug": {"resolve": {"listing": result.data}},
            "phase_metrics": [timer.finish()],
        }))),
        _ => Ok(NodeOutcome::advance(json!({
            "route_hint": ROUTE_SELECT,
            "facts": {"resolve": {"target_query": query, "candidates": candidates}},
            "debug": {"resolve": {"listing": result.data}},
            "phase_metrics": [timer.finish()],
        }))),
    }
}

/// Suspend on a target-select interrupt; the response is the chosen id.
pub async fn hitl_select_target(
    _ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let candidates = state
        .facts
        .get("resolve")
        .and_then(|r| r.get("candidates"))
        .cloned()
        .unwrap_or(Value::Array(vec![]));

    Ok(NodeOutcome::interrupt(
        json!({}),
        InterruptRequest::new(
            "target_select",
            json!({"type": "target_select", "candidates": candidates}),
            "target_graph_id",
            "load_current_flow",
        ),
    ))
}

/// Fetch the target graph and parse its payload as the compilation base.
pub async fn load_current_flow(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("load_current_flow");
    let target_id = state
        .target_graph_id
        .clone()
        .ok_or_else(|| CodevError::UnresolvedTarget("no target graph id in state".to_string()))?;

    let (result, _) = execute_tool(
        "flowise.get_graph",
        json!({"id": target_id}),
        &ctx.registry,
        None,
        ctx.config.tool_timeout,
    )
    .await;
    timer.add_tool_calls(1, 0);

    if !result.ok {
        return Err(CodevError::ToolExecution(
            result.error.unwrap_or_else(|| "graph fetch failed".to_string()),
        ));
    }

    // the platform stores flowData as a JSON string
    let base_graph = match &result.data["flowData"] {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .map_err(|e| CodevError::Structure(format!("unparseable flowData: {}", e)))?,
        Value::Object(_) => result.data["flowData"].clone(),
        _ => json!({"nodes": [], "edges": []}),
    };

    Ok(NodeOutcome::advance(json!({
        "base_graph": base_graph,
        "facts": {"resolve": {
            "target_query": state.facts.get("resolve").and_then(|r| r.get("target_query")).cloned(),
            "deployed": result.data["deployed"],
            "target_name": result.data["name"],
        }},
        "debug": {"load": {"chatflow": result.data}},
        "phase_metrics": [timer.finish()],
    })))
}

const SUMMARIZE_SYSTEM_PROMPT: &str = "\
Summarize an existing dataflow graph for a planning agent in at most five \
sentences: what the graph does, its node types, how they connect, and any \
unbound credential slots. State facts only.";

/// Distill the loaded graph into prompt-sized facts.
pub async fn summarize_current_flow(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("summarize_current_flow");

    let digest = super::base_graph_digest(&state);
    let detail: String = state
        .base_graph
        .as_ref()
        .map(crate::canonical::to_canonical_json)
        .unwrap_or_default()
        .chars()
        .take(6000)
        .collect();
    let prompt = format!("{}\n\nFull payload (for your reference only):\n{}", digest, detail);

    let response = ctx.chat(SUMMARIZE_SYSTEM_PROMPT, prompt).await?;
    let (input_tokens, output_tokens) = usage_update(&response);
    timer.add_tokens(input_tokens, output_tokens);

    Ok(NodeOutcome::advance(json!({
        "facts": {"flowise": {"current_flow_summary": response.text()}},
        "messages": [agentgraph_core::Message::assistant(response.text()).with_name("summarize_current_flow")],
        "total_input_tokens": input_tokens,
        "total_output_tokens": output_tokens,
        "phase_metrics": [timer.finish()],
    })))
}
