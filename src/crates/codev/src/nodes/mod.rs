//! The orchestration state machine
//!
//! Six phases over the engine graph:
//!
//! - **Intent**: `classify_intent` -> `hydrate_context`
//! - **Resolve** (UPDATE only): `resolve_target` -> [`hitl_select_target`]
//! - **Load** (UPDATE only): `load_current_flow` -> `summarize_current_flow`
//! - **Plan+Compile**: `clarify` -> `discover` -> `check_credentials` ->
//!   `plan_v2` -> `hitl_plan_v2` -> `define_scope` -> `compile_ir` ->
//!   `compile_flow`
//! - **Validate**: `validate` <-> `repair_schema`
//! - **Apply+Test+Evaluate**: `preflight` -> `apply_patch` -> `test` ->
//!   `evaluate` -> (`plan_v2` on ITERATE | `hitl_review_v2` on DONE)
//!
//! Every node deserializes the typed session state, does its work and
//! returns a partial update; the engine folds the update through the
//! channel schema and checkpoints. Failures cross exactly one boundary:
//! the wrapper in this module converts retriable errors into engine
//! retries and everything else into a terminal error record, so nodes
//! never leak exceptions into the scheduler.

pub mod apply;
pub mod clarify;
pub mod compile;
pub mod discover;
pub mod evaluate;
pub mod intent;
pub mod plan;
pub mod resolve;
pub mod testing;
pub mod validate;

use crate::capability::DomainCapability;
use crate::config::AgentConfig;
use crate::error::Result as CodevResult;
use crate::events::{event, EventKind, EventSink};
use crate::knowledge::anchor_store::AnchorDictionaryStore;
use crate::knowledge::credential_store::CredentialStore;
use crate::knowledge::pattern_store::PatternStore;
use crate::knowledge::schema_store::NodeSchemaStore;
use crate::knowledge::template_store::TemplateStore;
use crate::state::{Intent, SessionState};
use crate::tools::{DiscoverCache, ToolRegistry};
use agentgraph_core::graph::{NodeFuture, NodeOutcome, RunContext};
use agentgraph_core::{ChatModel, ChatRequest, ChatResponse, GraphError, Graph, Message, END};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

// Routing hints written into state by nodes with conditional successors.
pub(crate) const ROUTE_LOAD: &str = "load";
pub(crate) const ROUTE_SELECT: &str = "select";
pub(crate) const ROUTE_PROCEED: &str = "proceed";
pub(crate) const ROUTE_REPLAN: &str = "replan";
pub(crate) const ROUTE_OK: &str = "ok";
pub(crate) const ROUTE_REPAIR: &str = "repair";
pub(crate) const ROUTE_EVALUATE: &str = "evaluate";
pub(crate) const ROUTE_DONE: &str = "done";
pub(crate) const ROUTE_ITERATE: &str = "iterate";
pub(crate) const ROUTE_SCHEMA_MISSING: &str = "schema_missing";

/// Shared services every node draws on.
pub struct AgentContext {
    pub config: AgentConfig,
    pub model: Arc<dyn ChatModel>,
    pub registry: Arc<ToolRegistry>,
    pub cache: Arc<DiscoverCache>,
    pub schema_store: Arc<NodeSchemaStore>,
    pub anchor_store: Arc<AnchorDictionaryStore>,
    pub credential_store: Arc<CredentialStore>,
    pub template_store: Arc<TemplateStore>,
    pub pattern_store: Arc<dyn PatternStore>,
    pub capabilities: Vec<Arc<dyn DomainCapability>>,
    pub events: Arc<dyn EventSink>,
}

impl AgentContext {
    /// One chat call with the session's configured temperature.
    pub(crate) async fn chat(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> CodevResult<ChatResponse> {
        let request = ChatRequest::new(vec![
            Message::system(system.into()),
            Message::human(user.into()),
        ])
        .with_temperature(self.config.reasoning_temperature);
        Ok(self.model.chat(request).await?)
    }
}

/// Token-accounting fields for a state update from a chat response.
pub(crate) fn usage_update(response: &ChatResponse) -> (u64, u64) {
    response
        .usage
        .map(|u| (u.input_tokens, u.output_tokens))
        .unwrap_or((0, 0))
}

/// Terminal failure: record the taxonomy kind and halt the session.
pub(crate) fn fail(kind: &str, detail: impl Into<String>) -> NodeOutcome {
    NodeOutcome::halt(json!({
        "error": {"kind": kind, "detail": detail.into()},
    }))
}

/// Wrap a typed node body into the engine's node signature.
///
/// The single conversion boundary: retriable errors propagate for engine
/// backoff, all other errors become a terminal error record in state.
/// Every execution is bracketed by node lifecycle events in the sink.
fn node_fn<F, Fut>(
    ctx: &Arc<AgentContext>,
    name: &'static str,
    body: F,
) -> impl Fn(Value, RunContext) -> NodeFuture + Send + Sync + 'static
where
    F: Fn(Arc<AgentContext>, SessionState, RunContext) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = CodevResult<NodeOutcome>> + Send + 'static,
{
    let ctx = Arc::clone(ctx);
    move |state_value: Value, run_ctx: RunContext| {
        let ctx = Arc::clone(&ctx);
        let body = body.clone();
        Box::pin(async move {
            let thread_id = run_ctx.thread_id.clone();
            ctx.events
                .record(event(
                    &thread_id,
                    EventKind::NodeStarted,
                    json!({"node": name}),
                ))
                .await;

            let state = match SessionState::from_value(&state_value) {
                Ok(state) => state,
                Err(e) => {
                    ctx.events
                        .record(event(
                            &thread_id,
                            EventKind::NodeFinished,
                            json!({"node": name, "disposition": "error"}),
                        ))
                        .await;
                    return Err(GraphError::node_execution(name, e.to_string()));
                }
            };

            let (result, disposition) = match body(Arc::clone(&ctx), state, run_ctx).await {
                Ok(outcome) => {
                    let disposition = match &outcome {
                        NodeOutcome::Advance(_) => "advance",
                        NodeOutcome::Interrupt { .. } => "interrupt",
                        NodeOutcome::Halt(_) => "halt",
                    };
                    (Ok(outcome), disposition)
                }
                Err(e) if e.is_retriable() => (
                    Err(GraphError::retriable(name, e.to_string())),
                    "retriable_error",
                ),
                Err(e) => {
                    warn!(node = name, error = %e, "Node failed; session enters error state");
                    (Ok(fail(e.kind(), e.to_string())), "error")
                }
            };

            ctx.events
                .record(event(
                    &thread_id,
                    EventKind::NodeFinished,
                    json!({"node": name, "disposition": disposition}),
                ))
                .await;
            result
        })
    }
}

fn hint(state: &Value) -> &str {
    state["route_hint"].as_str().unwrap_or_default()
}

/// Assemble the full orchestration graph over the shared context.
pub fn build_agent_graph(ctx: &Arc<AgentContext>) -> Graph {
    let mut g = Graph::new();

    // Intent
    g.add_node("classify_intent", node_fn(ctx, "classify_intent", intent::classify_intent));
    g.add_node("hydrate_context", node_fn(ctx, "hydrate_context", intent::hydrate_context));

    // Resolve + Load (UPDATE only)
    g.add_node("resolve_target", node_fn(ctx, "resolve_target", resolve::resolve_target));
    g.add_node(
        "hitl_select_target",
        node_fn(ctx, "hitl_select_target", resolve::hitl_select_target),
    );
    g.add_node(
        "load_current_flow",
        node_fn(ctx, "load_current_flow", resolve::load_current_flow),
    );
    g.add_node(
        "summarize_current_flow",
        node_fn(ctx, "summarize_current_flow", resolve::summarize_current_flow),
    );

    // Plan + Compile
    g.add_node("clarify", node_fn(ctx, "clarify", clarify::clarify));
    g.add_node("discover", node_fn(ctx, "discover", discover::discover));
    g.add_node(
        "check_credentials",
        node_fn(ctx, "check_credentials", discover::check_credentials),
    );
    g.add_node("plan_v2", node_fn(ctx, "plan_v2", plan::plan_v2));
    g.add_node("hitl_plan_v2", node_fn(ctx, "hitl_plan_v2", plan::hitl_plan_v2));
    g.add_node("define_scope", node_fn(ctx, "define_scope", plan::define_scope));
    g.add_node("compile_ir", node_fn(ctx, "compile_ir", compile::compile_ir));
    g.add_node("compile_flow", node_fn(ctx, "compile_flow", compile::compile_flow));

    // Validate
    g.add_node("validate", node_fn(ctx, "validate", validate::validate));
    g.add_node("repair_schema", node_fn(ctx, "repair_schema", compile::repair_schema));

    // Apply + Test + Evaluate
    g.add_node("preflight", node_fn(ctx, "preflight", validate::preflight));
    g.add_node("apply_patch", node_fn(ctx, "apply_patch", apply::apply_patch));
    g.add_node("test", node_fn(ctx, "test", testing::test));
    g.add_node("evaluate", node_fn(ctx, "evaluate", evaluate::evaluate));
    g.add_node(
        "hitl_review_v2",
        node_fn(ctx, "hitl_review_v2", evaluate::hitl_review_v2),
    );

    g.set_entry("classify_intent");

    g.add_edge("classify_intent", "hydrate_context");
    g.add_conditional_edge("hydrate_context", |state| {
        if state["intent"] == "UPDATE" {
            "resolve_target".to_string()
        } else {
            "clarify".to_string()
        }
    });

    g.add_conditional_edge("resolve_target", |state| match hint(state) {
        ROUTE_SELECT => "hitl_select_target".to_string(),
        _ => "load_current_flow".to_string(),
    });
    g.add_edge("hitl_select_target", "load_current_flow");
    g.add_edge("load_current_flow", "summarize_current_flow");
    g.add_edge("summarize_current_flow", "clarify");

    g.add_edge("clarify", "discover");
    g.add_edge("discover", "check_credentials");
    g.add_edge("check_credentials", "plan_v2");
    g.add_edge("plan_v2", "hitl_plan_v2");
    g.add_edge("hitl_plan_v2", "define_scope");
    g.add_conditional_edge("define_scope", |state| match hint(state) {
        ROUTE_REPLAN => "plan_v2".to_string(),
        _ => "compile_ir".to_string(),
    });
    g.add_edge("compile_ir", "compile_flow");
    g.add_edge("compile_flow", "validate");

    g.add_conditional_edge("validate", |state| match hint(state) {
        ROUTE_REPAIR => "repair_schema".to_string(),
        ROUTE_OK => "preflight".to_string(),
        _ => "evaluate".to_string(),
    });
    g.add_edge("repair_schema", "compile_flow");

    g.add_conditional_edge("preflight", |state| match hint(state) {
        ROUTE_OK => "apply_patch".to_string(),
        _ => "evaluate".to_string(),
    });
    g.add_conditional_edge("apply_patch", |state| match hint(state) {
        ROUTE_OK => "test".to_string(),
        _ => "evaluate".to_string(),
    });
    g.add_edge("test", "evaluate");
    g.add_conditional_edge("evaluate", |state| match hint(state) {
        ROUTE_ITERATE => "plan_v2".to_string(),
        _ => "hitl_review_v2".to_string(),
    });
    g.add_edge("hitl_review_v2", END);

    g
}

/// Digest of the base graph for prompt injection.
pub(crate) fn base_graph_digest(state: &SessionState) -> String {
    match &state.base_graph {
        Some(base) => match crate::graphir::GraphIR::from_flow_data(base) {
            Ok(ir) => {
                let nodes: Vec<String> = ir
                    .node_type_map()
                    .into_iter()
                    .map(|(id, ty)| format!("{} ({})", id, ty))
                    .collect();
                format!(
                    "Current graph: {} nodes [{}], {} edges.",
                    ir.node_count(),
                    nodes.join(", "),
                    ir.edge_count()
                )
            }
            Err(_) => "Current graph: unparseable.".to_string(),
        },
        None => "No existing graph; building from scratch.".to_string(),
    }
}

pub(crate) fn intent_label(intent: Option<Intent>) -> &'static str {
    match intent {
        Some(Intent::Update) => "UPDATE",
        _ => "CREATE",
    }
}

#[cfg(test)]
mod tests {
    // graph assembly is validated structurally when CompiledGraph::new runs
    // in the session manager tests; here we only pin the routing closures
    use super::*;

    #[test]
    fn hint_reads_route_field() {
        assert_eq!(hint(&json!({"route_hint": "ok"})), "ok");
        assert_eq!(hint(&json!({})), "");
    }
}
