//! Apply node: the write guard and the external write
//!
//! The only node that mutates the platform. It recomputes the payload
//! hash from the state it actually holds and requires identity with both
//! the compile-time and validation-time hashes before any write leaves
//! the process.

use super::{AgentContext, ROUTE_EVALUATE, ROUTE_OK};
use crate::canonical;
use crate::compiler::verify_write_guard;
use crate::contracts::{ConvergeVerdict, VerdictCategory};
use crate::error::{CodevError, Result};
use crate::state::{Intent, SessionState};
use crate::telemetry::PhaseTimer;
use crate::tools::execute_tool;
use agentgraph_core::graph::{NodeOutcome, RunContext};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

fn plan_criteria(state: &SessionState) -> Vec<(String, bool)> {
    state
        .plan_contract
        .as_ref()
        .map(|c| {
            c.success_criteria
                .iter()
                .map(|criterion| (criterion.clone(), false))
                .collect()
        })
        .unwrap_or_default()
}

pub async fn apply_patch(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("apply_patch");

    let compiled = state
        .compiled_graph
        .clone()
        .ok_or_else(|| CodevError::Internal("apply_patch without a compiled graph".to_string()))?;
    let payload_hash = state.payload_hash.clone().unwrap_or_default();
    let validated_hash = state.validated_hash.clone().unwrap_or_default();

    // write guard: validation-time identity must equal apply-time identity
    if let Err(guard_err) = verify_write_guard(&compiled, &payload_hash, &validated_hash) {
        error!(
            thread_id = %state.thread_id,
            error = %guard_err,
            "Write guard rejected the payload; no external write performed"
        );
        let verdict = ConvergeVerdict::iterate(
            VerdictCategory::Structure,
            guard_err.to_string(),
            "recompile and revalidate before applying",
            plan_criteria(&state),
        );
        return Ok(NodeOutcome::advance(json!({
            "route_hint": ROUTE_EVALUATE,
            "verdict": verdict,
            "facts": {"apply": {"write_guard": "rejected"}},
            "debug": {"apply": {"error": guard_err.to_string(), "kind": "WRITE_GUARD_MISMATCH"}},
            "phase_metrics": [timer.finish()],
        })));
    }

    // the platform stores flowData as a string
    let flow_data_str = canonical::to_canonical_json(&compiled);

    let (result, target_graph_id) = match state.intent {
        Some(Intent::Update) => {
            let id = state.target_graph_id.clone().unwrap_or_default();
            let (result, _) = execute_tool(
                "flowise.update_graph",
                json!({"id": id, "body": {"flowData": flow_data_str, "deployed": true}}),
                &ctx.registry,
                None,
                ctx.config.tool_timeout,
            )
            .await;
            (result, id)
        }
        _ => {
            let name = state
                .plan_contract
                .as_ref()
                .map(|c| c.goal.clone())
                .unwrap_or_else(|| "codev graph".to_string());
            let (result, _) = execute_tool(
                "flowise.create_graph",
                json!({"name": name, "flowData": flow_data_str, "deployed": true}),
                &ctx.registry,
                None,
                ctx.config.tool_timeout,
            )
            .await;
            let id = result.data["id"].as_str().unwrap_or_default().to_string();
            (result, id)
        }
    };
    timer.add_tool_calls(1, 0);

    if !result.ok {
        let detail = result.error.unwrap_or_else(|| "platform write failed".to_string());
        let verdict = ConvergeVerdict::iterate(
            VerdictCategory::Incomplete,
            detail.clone(),
            "verify the target graph id and platform availability",
            plan_criteria(&state),
        );
        return Ok(NodeOutcome::advance(json!({
            "route_hint": ROUTE_EVALUATE,
            "verdict": verdict,
            "debug": {"apply": {"error": detail}},
            "phase_metrics": [timer.finish()],
        })));
    }

    info!(
        thread_id = %state.thread_id,
        graph_id = %target_graph_id,
        payload_hash = %payload_hash,
        "Patch applied"
    );

    Ok(NodeOutcome::advance(json!({
        "route_hint": ROUTE_OK,
        "target_graph_id": target_graph_id,
        "facts": {"apply": {"write_guard": "passed", "graph_id": target_graph_id}},
        "debug": {"apply": {"response": result.data}},
        "phase_metrics": [timer.finish()],
    })))
}
