//! Write-guard semantics: no external write without hash identity

mod common;

use agentgraph_core::graph::{NodeOutcome, RunContext};
use codev::canonical;
use codev::config::AgentConfig;
use codev::nodes::apply::apply_patch;
use codev::state::{Intent, SessionState};
use common::Harness;
use serde_json::json;
use std::sync::atomic::Ordering;

fn compiled_single_node() -> serde_json::Value {
    json!({
        "nodes": [
            {
                "id": "chatOpenAI_0",
                "type": "customNode",
                "position": {"x": 0, "y": 0},
                "data": {
                    "id": "chatOpenAI_0",
                    "name": "chatOpenAI",
                    "label": "ChatOpenAI",
                    "inputAnchors": [],
                    "inputParams": [],
                    "outputAnchors": [
                        {"id": "chatOpenAI_0-output-chatOpenAI-ChatOpenAI|BaseChatModel",
                         "name": "chatOpenAI"}
                    ],
                    "inputs": {"modelName": "gpt-4o"},
                    "outputs": {}
                }
            }
        ],
        "edges": []
    })
}

/// Mutating the compiled graph between validation and apply must abort
/// the write with a structure verdict and leave the platform untouched.
#[tokio::test]
async fn mutated_payload_is_rejected_before_any_write() {
    let harness = Harness::new(AgentConfig::for_tests()).await;

    let pristine = compiled_single_node();
    let sealed_hash = canonical::payload_hash(&pristine);

    let mut tampered = pristine.clone();
    tampered["nodes"][0]["data"]["inputs"]["modelName"] = json!("smuggled-model");

    let mut state = SessionState::default();
    state.thread_id = "t-guard".to_string();
    state.intent = Some(Intent::Create);
    state.compiled_graph = Some(tampered);
    state.payload_hash = Some(sealed_hash.clone());
    state.validated_hash = Some(sealed_hash);

    let outcome = apply_patch(harness.ctx.clone(), state, RunContext::default())
        .await
        .unwrap();

    let NodeOutcome::Advance(update) = outcome else {
        panic!("expected an advance into the verdict path");
    };
    assert_eq!(update["route_hint"], "evaluate");
    assert_eq!(update["verdict"]["status"], "ITERATE");
    assert_eq!(update["verdict"]["category"], "STRUCTURE");
    assert_eq!(update["debug"]["apply"]["kind"], "WRITE_GUARD_MISMATCH");

    // no external write happened
    assert_eq!(harness.platform.create_count.load(Ordering::SeqCst), 0);
    assert_eq!(harness.platform.update_count.load(Ordering::SeqCst), 0);
}

/// The identity case writes exactly once.
#[tokio::test]
async fn pristine_payload_passes_the_guard_and_writes() {
    let harness = Harness::new(AgentConfig::for_tests()).await;

    let pristine = compiled_single_node();
    let sealed_hash = canonical::payload_hash(&pristine);

    let mut state = SessionState::default();
    state.thread_id = "t-guard".to_string();
    state.intent = Some(Intent::Create);
    state.compiled_graph = Some(pristine);
    state.payload_hash = Some(sealed_hash.clone());
    state.validated_hash = Some(sealed_hash);

    let outcome = apply_patch(harness.ctx.clone(), state, RunContext::default())
        .await
        .unwrap();

    let NodeOutcome::Advance(update) = outcome else {
        panic!("expected an advance to test");
    };
    assert_eq!(update["route_hint"], "ok");
    assert_eq!(update["facts"]["apply"]["write_guard"], "passed");
    assert_eq!(harness.platform.create_count.load(Ordering::SeqCst), 1);
}

/// A stale validated hash (revalidation skipped after recompile) is
/// equally fatal.
#[tokio::test]
async fn stale_validated_hash_is_rejected() {
    let harness = Harness::new(AgentConfig::for_tests()).await;

    let pristine = compiled_single_node();

    let mut state = SessionState::default();
    state.thread_id = "t-guard".to_string();
    state.intent = Some(Intent::Create);
    state.payload_hash = Some(canonical::payload_hash(&pristine));
    state.validated_hash = Some("0".repeat(64));
    state.compiled_graph = Some(pristine);

    let outcome = apply_patch(harness.ctx.clone(), state, RunContext::default())
        .await
        .unwrap();

    let NodeOutcome::Advance(update) = outcome else {
        panic!("expected an advance into the verdict path");
    };
    assert_eq!(update["verdict"]["category"], "STRUCTURE");
    assert_eq!(harness.platform.create_count.load(Ordering::SeqCst), 0);
}
