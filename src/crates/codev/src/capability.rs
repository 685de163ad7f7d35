//! Domain capability abstraction
//!
//! A capability is the pluggable per-domain pair `discover + compile_ops`.
//! The orchestration graph holds a closed set of capabilities registered at
//! construction time; each contributes facts during discovery and ops
//! during IR compilation, and the compiler merges all contributions into a
//! single batch. [`FlowiseCapability`] is the platform-graphs variant; a
//! tool-protocol domain can slot in beside it without touching the
//! orchestrator.

use crate::contracts::{extract_json, PlanContract};
use crate::error::{CodevError, Result};
use crate::graphir::GraphIR;
use crate::ir::{parse_ops, Op};
use crate::knowledge::anchor_store::{AnchorDictionaryStore, AnchorDirection};
use crate::knowledge::credential_store::CredentialStore;
use crate::knowledge::pattern_store::PatternStore;
use crate::knowledge::schema_store::NodeSchemaStore;
use crate::knowledge::template_store::TemplateStore;
use crate::state::Intent;
use crate::tools::{execute_tool, DiscoverCache, ToolRegistry};
use agentgraph_core::{ChatModel, ChatRequest, Message};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Inputs available to discovery.
pub struct DiscoverContext<'a> {
    pub requirement: &'a str,
    pub clarification: Option<&'a str>,
    pub intent: Option<Intent>,
    pub base_graph: Option<&'a Value>,
}

/// What discovery produced for one domain.
#[derive(Debug, Clone, Default)]
pub struct DiscoverOutput {
    /// Distilled, prompt-safe summary
    pub summary: String,
    /// Structured facts, stored under the domain key
    pub facts: Value,
    /// Compile-time seeds, stored under the domain key
    pub artifacts: Value,
    /// Raw payloads, stored under the domain key; never prompt-visible
    pub debug: Value,
    pub tool_calls: u32,
    pub cache_hits: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Inputs available to op compilation.
pub struct CompileContext<'a> {
    pub plan: &'a PlanContract,
    pub base_graph: Option<&'a Value>,
    /// This domain's artifacts from discovery
    pub artifacts: Option<&'a Value>,
}

/// What op compilation produced for one domain.
#[derive(Debug, Clone, Default)]
pub struct CompileOpsOutput {
    pub ops: Vec<Op>,
    pub warnings: Vec<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The pluggable per-domain interface.
#[async_trait]
pub trait DomainCapability: Send + Sync {
    fn domain(&self) -> &str;

    async fn discover(&self, ctx: &DiscoverContext<'_>) -> Result<DiscoverOutput>;

    async fn compile_ops(&self, ctx: &CompileContext<'_>) -> Result<CompileOpsOutput>;
}

/// Platform-graphs capability.
pub struct FlowiseCapability {
    pub registry: Arc<ToolRegistry>,
    pub cache: Arc<DiscoverCache>,
    pub model: Arc<dyn ChatModel>,
    pub schema_store: Arc<NodeSchemaStore>,
    pub anchor_store: Arc<AnchorDictionaryStore>,
    pub credential_store: Arc<CredentialStore>,
    pub template_store: Arc<TemplateStore>,
    pub pattern_store: Arc<dyn PatternStore>,
    pub tool_timeout: Duration,
}

const DISCOVER_SYSTEM_PROMPT: &str = "\
You distill platform reconnaissance for a graph-building agent. From the \
tool summaries and credential inventory, write a compact factual summary \
(no speculation) of what exists on the platform that is relevant to the \
requirement. End with exactly this block:\n\
CREDENTIALS_STATUS: OK or MISSING\n\
MISSING_TYPES: comma-separated credential types the requirement needs but \
the inventory lacks (empty when OK)";

const COMPILE_SYSTEM_PROMPT: &str = "\
You translate an approved plan into graph patch operations. Output ONLY a \
JSON array of operations, each one of:\n\
{\"op\":\"add_node\",\"node_id\":...,\"node_type\":...,\"params\":{...}}\n\
{\"op\":\"set_param\",\"node_id\":...,\"path\":...,\"value\":...}\n\
{\"op\":\"connect\",\"source_node_id\":...,\"source_anchor\":...,\"target_node_id\":...,\"target_anchor\":...}\n\
{\"op\":\"bind_credential\",\"node_id\":...,\"credential_type\":...}\n\
Use only node types and anchor names from the dictionary provided. Never \
add a node that already exists in the base graph; connect to its id \
instead.";

impl FlowiseCapability {
    /// Keywords for pattern search: lowercase words of 4+ chars, deduped.
    fn keywords(requirement: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        requirement
            .split(|c: char| !c.is_alphanumeric())
            .map(|w| w.to_ascii_lowercase())
            .filter(|w| w.len() >= 4 && seen.insert(w.clone()))
            .take(8)
            .collect()
    }

    /// Compact anchor dictionary digest for the compile prompt.
    fn anchor_digest(&self) -> String {
        let mut lines = Vec::new();
        for node_type in self.schema_store.node_types() {
            let inputs = self
                .anchor_store
                .entries(&node_type, AnchorDirection::Input)
                .into_iter()
                .map(|e| format!("{}:{}", e.name, e.anchor_type))
                .collect::<Vec<_>>()
                .join(", ");
            let outputs = self
                .anchor_store
                .entries(&node_type, AnchorDirection::Output)
                .into_iter()
                .map(|e| format!("{}:{}", e.name, e.anchor_type))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "{} | inputs: [{}] | outputs: [{}]",
                node_type, inputs, outputs
            ));
        }
        lines.join("\n")
    }

    fn base_digest(base: Option<&Value>) -> String {
        match base.and_then(|b| GraphIR::from_flow_data(b).ok()) {
            Some(ir) if ir.node_count() > 0 => {
                let nodes: Vec<String> = ir
                    .node_type_map()
                    .into_iter()
                    .map(|(id, ty)| format!("{} ({})", id, ty))
                    .collect();
                format!(
                    "Base graph nodes: {}. Edges: {}.",
                    nodes.join(", "),
                    ir.edge_count()
                )
            }
            _ => "Base graph is empty.".to_string(),
        }
    }
}

#[async_trait]
impl DomainCapability for FlowiseCapability {
    fn domain(&self) -> &str {
        "flowise"
    }

    async fn discover(&self, ctx: &DiscoverContext<'_>) -> Result<DiscoverOutput> {
        let mut output = DiscoverOutput::default();
        let mut debug = serde_json::Map::new();
        let mut tool_summaries = Vec::new();

        for tool in [
            "flowise.list_nodes",
            "flowise.list_templates",
            "flowise.list_credentials",
        ] {
            let (result, cached) = execute_tool(
                tool,
                json!({}),
                &self.registry,
                Some(self.cache.as_ref()),
                self.tool_timeout,
            )
            .await;
            output.tool_calls += 1;
            if cached {
                output.cache_hits += 1;
            }

            if result.ok {
                match tool {
                    "flowise.list_credentials" => {
                        if let Err(e) = self.credential_store.refresh(&result.data) {
                            warn!(error = %e, "Credential refresh failed");
                        }
                    }
                    "flowise.list_templates" => {
                        if let Err(e) = self.template_store.refresh(&result.data) {
                            warn!(error = %e, "Template refresh failed");
                        }
                    }
                    _ => {}
                }
            }
            tool_summaries.push(format!("{}: {}", tool, result.summary));
            debug.insert(tool.to_string(), result.data);
        }

        // pattern search seeds the compile phase with a known-good graph
        let keywords = Self::keywords(ctx.requirement);
        let mut artifacts = serde_json::Map::new();
        match self
            .pattern_store
            .search_filtered(&keywords, Some(self.domain()), None, &[], 3)
            .await
        {
            Ok(patterns) if !patterns.is_empty() => {
                let best = &patterns[0];
                debug!(pattern_id = %best.id, "Seeding compile from pattern");
                if let Ok(Some(flow)) = self.pattern_store.apply_as_base_graph(&best.id).await {
                    artifacts.insert("base_graph_ir".to_string(), flow);
                    artifacts.insert("pattern_id".to_string(), json!(best.id));
                    artifacts.insert(
                        "pattern_node_types".to_string(),
                        json!(best.node_types),
                    );
                    tool_summaries.push(format!(
                        "pattern library: reusable pattern '{}' with nodes [{}]",
                        best.id,
                        best.node_types.join(", ")
                    ));
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Pattern search failed"),
        }

        let credential_types = self.credential_store.types_present();
        let mut prompt = format!(
            "Requirement: {}\n{}Intent: {}\n\nTool summaries:\n{}\n\nCredential types present: [{}]",
            ctx.requirement,
            ctx.clarification
                .map(|c| format!("Clarification: {}\n", c))
                .unwrap_or_default(),
            match ctx.intent {
                Some(Intent::Update) => "UPDATE",
                _ => "CREATE",
            },
            tool_summaries.join("\n"),
            credential_types.join(", "),
        );
        if ctx.base_graph.is_some() {
            prompt.push_str(&format!("\n{}", Self::base_digest(ctx.base_graph)));
        }

        let response = self
            .model
            .chat(ChatRequest::new(vec![
                Message::system(DISCOVER_SYSTEM_PROMPT),
                Message::human(prompt),
            ]))
            .await
            .map_err(CodevError::from)?;

        if let Some(usage) = response.usage {
            output.input_tokens = usage.input_tokens;
            output.output_tokens = usage.output_tokens;
        }
        output.summary = response.text().to_string();
        output.facts = json!({
            "node_count": self.schema_store.node_count(),
            "template_count": self.template_store.len(),
            "credential_types": credential_types,
            "pattern_id": artifacts.get("pattern_id").cloned().unwrap_or(Value::Null),
        });
        output.artifacts = Value::Object(artifacts);
        output.debug = Value::Object(debug);
        Ok(output)
    }

    async fn compile_ops(&self, ctx: &CompileContext<'_>) -> Result<CompileOpsOutput> {
        // a pattern seed replaces an empty base so the model extends the
        // pattern's nodes instead of re-adding them
        let pattern_seed = ctx
            .artifacts
            .and_then(|a| a.get("base_graph_ir"))
            .filter(|_| ctx.base_graph.is_none());
        let effective_base = ctx.base_graph.or(pattern_seed);

        let prompt = format!(
            "Plan:\n{}\n\n{}\n\nNode and anchor dictionary:\n{}",
            ctx.plan.raw_plan,
            Self::base_digest(effective_base),
            self.anchor_digest(),
        );

        let response = self
            .model
            .chat(ChatRequest::new(vec![
                Message::system(COMPILE_SYSTEM_PROMPT),
                Message::human(prompt),
            ]))
            .await
            .map_err(CodevError::from)?;

        let mut output = CompileOpsOutput::default();
        if let Some(usage) = response.usage {
            output.input_tokens = usage.input_tokens;
            output.output_tokens = usage.output_tokens;
        }

        let ops_value = extract_json(response.text())?;
        let ops = parse_ops(&ops_value)?;

        // a pattern-seeded compile never re-adds nodes the seed already has
        let existing: HashSet<String> = effective_base
            .and_then(|b| GraphIR::from_flow_data(b).ok())
            .map(|ir| ir.node_ids().into_iter().collect())
            .unwrap_or_default();
        let mut warnings = Vec::new();
        let kept: Vec<Op> = ops
            .into_iter()
            .filter(|op| match op {
                Op::AddNode { node_id, .. } if existing.contains(node_id) => {
                    warnings.push(format!(
                        "dropped add_node for '{}': already present in the base graph",
                        node_id
                    ));
                    false
                }
                _ => true,
            })
            .collect();
        output.ops = kept;
        output.warnings = warnings;

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_dedupe_and_filter_short_words() {
        let kw = FlowiseCapability::keywords("Build a chat bot that can chat about PDFs");
        assert!(kw.contains(&"chat".to_string()));
        assert!(kw.contains(&"pdfs".to_string()));
        assert!(!kw.contains(&"a".to_string()));
        // "chat" appears twice in the requirement but once in the keywords
        assert_eq!(kw.iter().filter(|k| *k == "chat").count(), 1);
    }

    #[test]
    fn base_digest_names_nodes() {
        let digest =
            FlowiseCapability::base_digest(Some(&crate::graphir::test_fixtures::sample_flow()));
        assert!(digest.contains("chatOpenAI_0 (chatOpenAI)"));
        assert!(digest.contains("Edges: 1"));
        assert_eq!(
            FlowiseCapability::base_digest(None),
            "Base graph is empty."
        );
    }
}
