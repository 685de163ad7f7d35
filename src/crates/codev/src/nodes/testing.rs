//! Test node: run the suite against the live graph
//!
//! Cases run sequentially; within a case, all `k` trials run concurrently
//! and are gathered before moving on. Session ids follow the case's
//! strategy: fresh per trial, or shared across the suite to exercise
//! memory.

use super::AgentContext;
use crate::contracts::{SessionIdStrategy, TestResult, TestSuite};
use crate::error::Result;
use crate::state::SessionState;
use crate::telemetry::PhaseTimer;
use crate::tools::execute_tool;
use agentgraph_core::graph::{NodeOutcome, RunContext};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

pub async fn test(
    ctx: Arc<AgentContext>,
    state: SessionState,
    _run: RunContext,
) -> Result<NodeOutcome> {
    let mut timer = PhaseTimer::start("test");
    let suite = state.test_suite.clone().unwrap_or_else(|| TestSuite {
        cases: Vec::new(),
        integration_tests: Vec::new(),
        domain_scopes: Vec::new(),
        trials_k: 1,
    });
    let graph_id = state.target_graph_id.clone().unwrap_or_default();
    let shared_session = Uuid::new_v4().to_string();

    let mut results: Vec<TestResult> = Vec::new();
    let mut raw_responses = Vec::new();

    for case in &suite.cases {
        let trials_k = suite.trials_k.max(1);
        let trials = (0..trials_k).map(|trial| {
            let ctx = Arc::clone(&ctx);
            let graph_id = graph_id.clone();
            let prompt = case.prompt.clone();
            let session_id = match case.session_id_strategy {
                SessionIdStrategy::Fresh => Uuid::new_v4().to_string(),
                SessionIdStrategy::Shared => shared_session.clone(),
            };
            async move {
                let started = Instant::now();
                let (result, _) = execute_tool(
                    "flowise.run_prediction",
                    json!({
                        "id": graph_id,
                        "body": {
                            "question": prompt,
                            "overrideConfig": {"sessionId": session_id},
                        },
                    }),
                    &ctx.registry,
                    None,
                    ctx.config.tool_timeout,
                )
                .await;
                (trial, result, started.elapsed().as_millis() as u64)
            }
        });

        for (trial, result, latency_ms) in join_all(trials).await {
            timer.add_tool_calls(1, 0);
            let response_text = result.data["text"].as_str().unwrap_or_default().to_string();
            let passed = result.ok && case.expected.evaluate(&response_text);
            results.push(TestResult {
                case_prompt: case.prompt.clone(),
                trial,
                passed,
                response_excerpt: response_text.chars().take(300).collect(),
                latency_ms,
            });
            raw_responses.push(result.data);
        }
    }

    let passed = results.iter().filter(|r| r.passed).count();
    info!(
        thread_id = %state.thread_id,
        passed,
        total = results.len(),
        "Test suite finished"
    );

    Ok(NodeOutcome::advance(json!({
        "test_results": results,
        "facts": {"test": {"passed": passed, "total": results.len()}},
        "debug": {"test": {"responses": raw_responses}},
        "phase_metrics": [timer.finish()],
    })))
}
