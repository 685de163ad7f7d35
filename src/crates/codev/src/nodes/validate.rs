//! Validate and preflight nodes
//!
//! `validate` runs the post-compile structural check and stamps
//! `validated_hash` on success, or routes through schema repair (once) or
//! the verdict path. `preflight` re-checks the write target immediately
//! before apply.

use super::{AgentContext, ROUTE_EVALUATE, ROUTE_OK, ROUTE_REPAIR, ROUTE_SCHEMA_MISSING};
use crate::contracts::{ConvergeVerdict, VerdictCategory};
use crate::error::Result;
use crate::graphir::validate_flow_data;
use crate::state::{Intent, SessionState};
use crate::telemetry::PhaseTimer;
use crate::tools::execute_tool;
use agentgraph_core::graph::{NodeOutcome, RunContext};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

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

/// Post-compile structural validation.
pub async fn validate(
    _ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("validate");

    // compile_flow hit an unknown node type: repair once, then give up
    if state.route_hint.as_deref() == Some(ROUTE_SCHEMA_MISSING) {
        if !state.schema_repair_attempted {
            return Ok(NodeOutcome::advance(json!({
                "route_hint": ROUTE_REPAIR,
                "phase_metrics": [timer.finish()],
            })));
        }
        let target = state.schema_repair_target.clone().unwrap_or_default();
        warn!(thread_id = %state.thread_id, node_type = %target, "Schema still missing after repair");
        let verdict = ConvergeVerdict::iterate(
            VerdictCategory::Structure,
            format!("node type '{}' is not in the schema registry", target),
            "use a node type present in the registry",
            plan_criteria(&state),
        );
        return Ok(NodeOutcome::advance(json!({
            "route_hint": ROUTE_EVALUATE,
            "verdict": verdict,
            "phase_metrics": [timer.finish()],
        })));
    }

    let Some(compiled) = &state.compiled_graph else {
        let verdict = ConvergeVerdict::iterate(
            VerdictCategory::Structure,
            "no compiled graph to validate",
            "re-run compilation",
            plan_criteria(&state),
        );
        return Ok(NodeOutcome::advance(json!({
            "route_hint": ROUTE_EVALUATE,
            "verdict": verdict,
            "phase_metrics": [timer.finish()],
        })));
    };

    match validate_flow_data(compiled) {
        Ok(()) => {
            info!(thread_id = %state.thread_id, "Structural validation passed");
            Ok(NodeOutcome::advance(json!({
                "validated_hash": state.payload_hash,
                "route_hint": ROUTE_OK,
                "phase_metrics": [timer.finish()],
            })))
        }
        Err(e) => {
            warn!(thread_id = %state.thread_id, error = %e, "Structural validation failed");
            timer.add_repair_event();
            let verdict = ConvergeVerdict::iterate(
                VerdictCategory::Structure,
                e.to_string(),
                "fix the structural defect named in the reason",
                plan_criteria(&state),
            );
            Ok(NodeOutcome::advance(json!({
                "route_hint": ROUTE_EVALUATE,
                "verdict": verdict,
                "phase_metrics": [timer.finish()],
            })))
        }
    }
}

/// Final checks immediately before the external write: minimum payload
/// shape, and in UPDATE mode that the target still exists and is deployed.
pub async fn preflight(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("preflight");

    let shape_ok = state
        .compiled_graph
        .as_ref()
        .map(|g| g.get("nodes").map(Value::is_array).unwrap_or(false)
            && g.get("edges").map(Value::is_array).unwrap_or(false))
        .unwrap_or(false);
    if !shape_ok {
        let verdict = ConvergeVerdict::iterate(
            VerdictCategory::Structure,
            "compiled payload lacks the minimum {nodes: [], edges: []} shape",
            "recompile with a well-formed payload",
            plan_criteria(&state),
        );
        return Ok(NodeOutcome::advance(json!({
            "route_hint": ROUTE_EVALUATE,
            "verdict": verdict,
            "phase_metrics": [timer.finish()],
        })));
    }

    if state.intent == Some(Intent::Update) {
        let target_id = state.target_graph_id.clone().unwrap_or_default();
        let (result, _) = execute_tool(
            "flowise.get_graph",
            json!({"id": target_id}),
            &ctx.registry,
            None,
            ctx.config.tool_timeout,
        )
        .await;
        timer.add_tool_calls(1, 0);

        let deployed = result.ok && result.data["deployed"].as_bool().unwrap_or(false);
        if !result.ok || !deployed {
            warn!(
                thread_id = %state.thread_id,
                target = %target_id,
                "Preflight: target missing or not deployed"
            );
            let verdict = ConvergeVerdict::iterate(
                VerdictCategory::Incomplete,
                format!("target graph '{}' is missing or not deployed", target_id),
                "verify deployed=true and that the correct target graph id is used",
                plan_criteria(&state),
            );
            return Ok(NodeOutcome::advance(json!({
                "route_hint": ROUTE_EVALUATE,
                "verdict": verdict,
                "debug": {"preflight": {"target": result.data}},
                "phase_metrics": [timer.finish()],
            })));
        }
    }

    Ok(NodeOutcome::advance(json!({
        "route_hint": ROUTE_OK,
        "phase_metrics": [timer.finish()],
    })))
}
