//! Plan phase: produce the plan, get it approved, define the test scope
//!
//! On iterations after a failed evaluation, the plan prompt additionally
//! receives the previous verdict block and the category's repair playbook
//! entry.

use super::{intent_label, usage_update, AgentContext, ROUTE_PROCEED, ROUTE_REPLAN};
use crate::contracts::{
    parse_plan_contract, ExpectedPredicate, SessionIdStrategy, TestCase, TestSuite,
};
use crate::error::Result;
use crate::playbook::iterate_guidance;
use crate::state::SessionState;
use crate::telemetry::PhaseTimer;
use agentgraph_core::graph::{NodeOutcome, RunContext};
use agentgraph_core::{InterruptRequest, Message};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const PLAN_SYSTEM_PROMPT: &str = "\
You plan changes to a dataflow graph on a low-code platform. Write a \
short markdown plan an engineer could follow, then end with exactly this \
block:\n\
GOAL: one-line goal\n\
ACTION: CREATE or UPDATE\n\
DOMAIN_TARGETS: comma-separated domains\n\
CREDENTIAL_REQUIREMENTS: comma-separated credential types, or none\n\
DATA_FIELDS: comma-separated data fields handled, or none\n\
PII_FIELDS: comma-separated PII fields handled, or none\n\
SUCCESS_CRITERIA:\n\
- one testable criterion per line\n\
Work only from the discovery summary; do not invent platform facts.";

pub async fn plan_v2(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("plan_v2");

    let mut prompt = format!(
        "Requirement: {}\n{}Intent: {}\nIteration: {}\n\nDiscovery summary:\n{}\n\n{}",
        state.requirement,
        state
            .clarification
            .as_deref()
            .map(|c| format!("Clarification: {}\n", c))
            .unwrap_or_default(),
        intent_label(state.intent),
        state.iteration,
        state.discovery_summary,
        super::base_graph_digest(&state),
    );

    // evaluator feedback plus the category playbook, every iteration
    if state.iteration > 0 {
        if let Some(verdict) = &state.verdict {
            if let Some(category) = verdict.category {
                prompt.push_str("\n\n");
                prompt.push_str(&iterate_guidance(
                    category,
                    verdict.reason.as_deref(),
                    verdict.fix.as_deref(),
                ));
            }
        }
        if let Some(feedback) = &state.plan_approval_response {
            if !feedback.to_ascii_lowercase().starts_with("approve") {
                prompt.push_str(&format!("\n\nReviewer feedback on the last plan: {}", feedback));
            }
        }
    }

    let response = ctx.chat(PLAN_SYSTEM_PROMPT, prompt).await?;
    let (input_tokens, output_tokens) = usage_update(&response);
    timer.add_tokens(input_tokens, output_tokens);

    let contract = parse_plan_contract(response.text(), intent_label(state.intent))?;
    info!(
        thread_id = %state.thread_id,
        iteration = state.iteration,
        criteria = contract.success_criteria.len(),
        "Plan produced"
    );

    Ok(NodeOutcome::advance(json!({
        "plan_text": response.text(),
        "plan_contract": contract,
        "messages": [Message::assistant(response.text()).with_name("plan_v2")],
        "total_input_tokens": input_tokens,
        "total_output_tokens": output_tokens,
        "phase_metrics": [timer.finish()],
    })))
}

/// Unconditional plan-approval interrupt; fires every iteration.
pub async fn hitl_plan_v2(
    _ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    Ok(NodeOutcome::interrupt(
        json!({}),
        InterruptRequest::new(
            "plan_approval",
            json!({
                "type": "plan_approval",
                "plan": state.plan_text,
                "contract": state.plan_contract,
            }),
            "plan_approval_response",
            "define_scope",
        ),
    ))
}

/// Consume the approval response: approved plans get a test suite; a
/// rejection routes back to planning with the feedback attached.
pub async fn define_scope(
    _ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let response = state
        .plan_approval_response
        .clone()
        .unwrap_or_default();
    let normalized = response.trim().to_ascii_lowercase();
    let approved = normalized.starts_with("approve")
        || normalized == "yes"
        || normalized == "ok"
        || normalized == "lgtm";

    if !approved {
        info!(thread_id = %state.thread_id, "Plan rejected; replanning");
        return Ok(NodeOutcome::advance(json!({
            "route_hint": ROUTE_REPLAN,
            "messages": [Message::human(format!("Plan feedback: {}", response)).with_name("define_scope")],
        })));
    }

    let contract = state.plan_contract.clone().unwrap_or_default();
    let suite = build_test_suite(&contract.success_criteria, &state.requirement);

    Ok(NodeOutcome::advance(json!({
        "route_hint": ROUTE_PROCEED,
        "test_suite": suite,
        "facts": {"scope": {"domain_scopes": contract.domain_targets}},
    })))
}

/// Derive an executable suite from the plan's success criteria.
///
/// Criteria written as `response contains 'x'` or `response matches /re/`
/// become targeted predicates; anything else falls back to a non-empty
/// smoke check.
fn build_test_suite(criteria: &[String], requirement: &str) -> TestSuite {
    let mut cases = Vec::new();

    for criterion in criteria {
        let lower = criterion.to_ascii_lowercase();
        let predicate = if let Some(needle) = extract_quoted(criterion) {
            if lower.contains("contain") || lower.contains("mention") {
                Some(ExpectedPredicate::Contains { needle })
            } else {
                None
            }
        } else if let Some(pattern) = extract_slashed(criterion) {
            Some(ExpectedPredicate::Matches { pattern })
        } else {
            None
        };

        if let Some(expected) = predicate {
            cases.push(TestCase {
                prompt: requirement.to_string(),
                expected,
                session_id_strategy: SessionIdStrategy::Fresh,
            });
        }
    }

    // always at least a smoke case
    if cases.is_empty() || !criteria.iter().any(|c| extract_quoted(c).is_some()) {
        cases.insert(
            0,
            TestCase {
                prompt: "hello".to_string(),
                expected: ExpectedPredicate::NonEmpty,
                session_id_strategy: SessionIdStrategy::Fresh,
            },
        );
    }

    TestSuite {
        cases,
        integration_tests: Vec::new(),
        domain_scopes: vec!["flowise".to_string()],
        trials_k: 1,
    }
}

fn extract_quoted(text: &str) -> Option<String> {
    let start = text.find('\'')?;
    let end = text[start + 1..].find('\'')? + start + 1;
    (end > start + 1).then(|| text[start + 1..end].to_string())
}

fn extract_slashed(text: &str) -> Option<String> {
    let start = text.find('/')?;
    let end = text[start + 1..].find('/')? + start + 1;
    (end > start + 1).then(|| text[start + 1..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_always_has_smoke_case() {
        let suite = build_test_suite(&["graph validates".to_string()], "build a bot");
        assert_eq!(suite.cases.len(), 1);
        assert_eq!(suite.cases[0].expected, ExpectedPredicate::NonEmpty);
        assert_eq!(suite.trials_k, 1);
    }

    #[test]
    fn contains_criterion_becomes_targeted_case() {
        let suite = build_test_suite(
            &["response contains 'invoice'".to_string()],
            "answer invoice questions",
        );
        assert!(suite.cases.iter().any(|c| matches!(
            &c.expected,
            ExpectedPredicate::Contains { needle } if needle == "invoice"
        )));
    }

    #[test]
    fn quoted_extraction() {
        assert_eq!(extract_quoted("contains 'abc'"), Some("abc".to_string()));
        assert_eq!(extract_quoted("no quotes"), None);
        assert_eq!(extract_slashed("matches /\\d+/"), Some("\\d+".to_string()));
    }
}
