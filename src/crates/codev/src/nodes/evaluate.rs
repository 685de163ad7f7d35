//! Evaluate node and the final review interrupt
//!
//! `evaluate` turns test evidence into a structured verdict. Failure paths
//! upstream (validate, preflight, apply) pre-stage a verdict and route
//! here directly; otherwise the evaluator model judges the test results
//! against the plan's success criteria. ITERATE increments the iteration
//! counter, bounded by the budget; DONE hands off to the human review.

use super::{fail, usage_update, AgentContext, ROUTE_DONE, ROUTE_EVALUATE, ROUTE_ITERATE};
use crate::contracts::{parse_verdict, VerdictStatus};
use crate::error::{CodevError, Result};
use crate::knowledge::pattern_store::NewPattern;
use crate::state::SessionState;
use crate::telemetry::PhaseTimer;
use agentgraph_core::graph::{NodeOutcome, RunContext};
use agentgraph_core::{InterruptRequest, Message};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const EVALUATE_SYSTEM_PROMPT: &str = "\
You judge whether a deployed graph satisfies its plan. Weigh each success \
criterion against the test evidence. Answer with exactly:\n\
VERDICT: DONE or ITERATE\n\
CATEGORY: CREDENTIAL, STRUCTURE, LOGIC or INCOMPLETE (ITERATE only)\n\
REASON: one line (ITERATE only)\n\
FIX: one concrete next step (ITERATE only)\n\
CRITERIA:\n\
- [pass] or [fail] followed by the criterion text, one line per criterion";

pub async fn evaluate(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("evaluate");
    let criteria: Vec<String> = state
        .plan_contract
        .as_ref()
        .map(|c| c.success_criteria.clone())
        .unwrap_or_default();

    // failure paths arrive with the verdict already staged
    let preset = state.route_hint.as_deref() == Some(ROUTE_EVALUATE);
    let (verdict, usage) = if preset {
        let verdict = state.verdict.clone().ok_or_else(|| {
            CodevError::Internal("evaluate routed with no staged verdict".to_string())
        })?;
        (verdict, (0, 0))
    } else {
        let evidence: Vec<String> = state
            .test_results
            .iter()
            .map(|r| {
                format!(
                    "[{}] trial {} of '{}': {}",
                    if r.passed { "pass" } else { "fail" },
                    r.trial,
                    r.case_prompt,
                    r.response_excerpt
                )
            })
            .collect();
        let prompt = format!(
            "Plan goal: {}\n\nSuccess criteria:\n{}\n\nTest evidence:\n{}",
            state
                .plan_contract
                .as_ref()
                .map(|c| c.goal.clone())
                .unwrap_or_default(),
            criteria
                .iter()
                .map(|c| format!("- {}", c))
                .collect::<Vec<_>>()
                .join("\n"),
            evidence.join("\n"),
        );

        let response = ctx.chat(EVALUATE_SYSTEM_PROMPT, prompt).await?;
        let usage = usage_update(&response);
        timer.add_tokens(usage.0, usage.1);
        (parse_verdict(response.text(), &criteria)?, usage)
    };

    let token_total =
        state.total_input_tokens + state.total_output_tokens + usage.0 + usage.1;

    match verdict.status {
        VerdictStatus::Done => {
            info!(thread_id = %state.thread_id, "Verdict: DONE");
            let note = format!("Verdict: DONE ({} criteria)", verdict.criteria_pass_map.len());
            Ok(NodeOutcome::advance(json!({
                "verdict": verdict,
                "route_hint": ROUTE_DONE,
                "messages": [Message::assistant(note).with_name("evaluate")],
                "total_input_tokens": usage.0,
                "total_output_tokens": usage.1,
                "phase_metrics": [timer.finish()],
            })))
        }
        VerdictStatus::Iterate => {
            // budget gates: iteration cap and token ceiling
            if state.iteration >= ctx.config.max_iterations {
                warn!(
                    thread_id = %state.thread_id,
                    iteration = state.iteration,
                    "Iteration budget exhausted"
                );
                return Ok(fail(
                    "EXHAUSTED",
                    format!(
                        "iteration budget of {} reached with verdict still ITERATE",
                        ctx.config.max_iterations
                    ),
                ));
            }
            if token_total >= ctx.config.token_ceiling {
                warn!(thread_id = %state.thread_id, token_total, "Token budget exhausted");
                return Ok(fail(
                    "EXHAUSTED",
                    format!("token ceiling of {} reached", ctx.config.token_ceiling),
                ));
            }

            let category = verdict
                .category
                .map(|c| c.as_str().to_string())
                .unwrap_or_default();
            info!(
                thread_id = %state.thread_id,
                category = %category,
                iteration = state.iteration + 1,
                "Verdict: ITERATE"
            );
            Ok(NodeOutcome::advance(json!({
                "verdict": verdict,
                "iteration": state.iteration + 1,
                "route_hint": ROUTE_ITERATE,
                // the next cycle replaces the patch wholesale
                "patch_ops": [],
                "compiled_graph": Value::Null,
                "payload_hash": Value::Null,
                "validated_hash": Value::Null,
                "test_results": [],
                "messages": [Message::assistant(format!("Verdict: ITERATE ({})", category)).with_name("evaluate")],
                "total_input_tokens": usage.0,
                "total_output_tokens": usage.1,
                "phase_metrics": [timer.finish()],
            })))
        }
    }
}

/// Final human review. First entry suspends with the verdict; the resumed
/// entry consumes the response: acceptance deposits the session's graph
/// into the pattern library (best effort) and ends the session.
pub async fn hitl_review_v2(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let Some(response) = state.review_response.clone() else {
        return Ok(NodeOutcome::interrupt(
            json!({}),
            InterruptRequest::new(
                "result_review",
                json!({
                    "type": "result_review",
                    "verdict": state.verdict,
                    "graph_id": state.target_graph_id,
                }),
                "review_response",
                "hitl_review_v2",
            ),
        ));
    };

    let normalized = response.trim().to_ascii_lowercase();
    let accepted = normalized.starts_with("accept")
        || normalized.starts_with("approve")
        || normalized == "yes"
        || normalized == "ok"
        || normalized == "lgtm";

    if accepted {
        save_pattern(&ctx, &state).await;
        info!(thread_id = %state.thread_id, "Result accepted; session complete");
        Ok(NodeOutcome::halt(json!({
            "facts": {"review": {"accepted": true}},
        })))
    } else {
        info!(thread_id = %state.thread_id, "Result rejected by reviewer");
        Ok(NodeOutcome::halt(json!({
            "facts": {"review": {"accepted": false, "feedback": response}},
        })))
    }
}

/// Best-effort pattern deposit; failure logs and never blocks completion.
async fn save_pattern(ctx: &Arc<AgentContext>, state: &SessionState) {
    let Some(compiled) = &state.compiled_graph else {
        return;
    };
    let node_types: Vec<String> = crate::graphir::GraphIR::from_flow_data(compiled)
        .map(|ir| {
            let mut types: Vec<String> = ir.node_type_map().into_values().collect();
            types.sort();
            types.dedup();
            types
        })
        .unwrap_or_default();

    let keywords: Vec<String> = state
        .requirement
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_ascii_lowercase())
        .filter(|w| w.len() >= 4)
        .take(8)
        .collect();

    let pattern = NewPattern {
        keywords,
        domain: "flowise".to_string(),
        node_types,
        category: state
            .plan_contract
            .as_ref()
            .map(|c| c.action.to_ascii_lowercase())
            .unwrap_or_else(|| "general".to_string()),
        schema_fingerprint: state.schema_fingerprint.clone().unwrap_or_default(),
        flow_data: compiled.clone(),
    };

    match ctx.pattern_store.save(pattern).await {
        Ok(saved) => info!(pattern_id = %saved.id, "Pattern saved"),
        Err(e) => warn!(error = %e, "Pattern save failed (non-fatal)"),
    }

    // a reused pattern that led to success gets its counter bumped too
    if let Some(pattern_id) = state
        .artifacts
        .get("flowise")
        .and_then(|a| a["pattern_id"].as_str())
    {
        if let Err(e) = ctx.pattern_store.record_success(pattern_id).await {
            warn!(error = %e, "Pattern success bump failed (non-fatal)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ConvergeVerdict, VerdictCategory};

    #[test]
    fn preset_verdict_shape() {
        let verdict = ConvergeVerdict::iterate(
            VerdictCategory::Structure,
            "bad shape",
            "fix it",
            vec![("criterion".to_string(), false)],
        );
        assert_eq!(verdict.status, VerdictStatus::Iterate);
        assert!(!verdict.is_done());
    }
}
