//! Deterministic patch compiler
//!
//! `compile_patch_ops` is a pure function from an op batch plus a base
//! graph to a platform-ready payload and its hash. It performs no I/O: all
//! schema and credential knowledge comes in through the stores, which are
//! in-memory snapshots. Anchor identifiers are always derived from
//! schema-provided templates, so the compiler cannot invent ports that do
//! not exist.
//!
//! Anchor resolution is exact-match first. The fuzzy fallback ladder below
//! exists for sessions recorded before canonical anchor names were
//! enforced and is deprecated; every fuzzy hit is counted and logged.

use crate::canonical;
use crate::error::{CodevError, Result};
use crate::graphir::GraphIR;
use crate::ir::{validate_patch_ops, Op};
use crate::knowledge::anchor_store::{AnchorDictionaryStore, AnchorEntry};
use crate::knowledge::credential_store::CredentialStore;
use crate::knowledge::schema_store::{NodeSchema, NodeSchemaStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Counters for anchor resolution quality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorResolutionMetrics {
    pub total_connections: u32,
    pub exact_matches: u32,
    pub fuzzy_fallbacks: u32,
}

impl AnchorResolutionMetrics {
    pub fn exact_match_rate(&self) -> f64 {
        if self.total_connections == 0 {
            1.0
        } else {
            f64::from(self.exact_matches) / f64::from(self.total_connections)
        }
    }
}

/// Change counts relative to the base graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added_nodes: u32,
    pub removed_nodes: u32,
    pub changed_params: u32,
    pub added_edges: u32,
    pub removed_edges: u32,
}

/// Output of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompiledPatch {
    pub flow_data: Value,
    /// SHA-256 over the canonical serialization of `flow_data`
    pub payload_hash: String,
    pub diff_summary: DiffSummary,
    pub anchor_metrics: AnchorResolutionMetrics,
    pub warnings: Vec<String>,
}

/// The patch compiler, bound to its knowledge stores.
pub struct PatchCompiler<'a> {
    pub schema_store: &'a NodeSchemaStore,
    pub anchor_store: &'a AnchorDictionaryStore,
    pub credential_store: &'a CredentialStore,
}

impl<'a> PatchCompiler<'a> {
    pub fn new(
        schema_store: &'a NodeSchemaStore,
        anchor_store: &'a AnchorDictionaryStore,
        credential_store: &'a CredentialStore,
    ) -> Self {
        Self {
            schema_store,
            anchor_store,
            credential_store,
        }
    }

    /// Apply `ops` in order over `base_graph` (empty graph when absent) and
    /// seal the result with its payload hash.
    pub fn compile_patch_ops(
        &self,
        ops: &[Op],
        base_graph: Option<&Value>,
    ) -> Result<CompiledPatch> {
        let mut ir = match base_graph {
            Some(flow) => GraphIR::from_flow_data(flow)?,
            None => GraphIR::empty(),
        };
        let base_ir = ir.clone();

        let node_type_map = ir.node_type_map();
        let warnings = validate_patch_ops(ops, &node_type_map, Some(self.anchor_store))?;

        // every node type this batch touches must be in the registry before
        // any op is applied; an unknown type routes to schema repair
        let mut types: HashMap<String, String> = node_type_map;
        for op in ops {
            if let Op::AddNode {
                node_id, node_type, ..
            } = op
            {
                if !self.schema_store.contains(node_type) {
                    return Err(CodevError::SchemaMissing(node_type.clone()));
                }
                types.insert(node_id.clone(), node_type.clone());
            }
        }

        let mut metrics = AnchorResolutionMetrics::default();
        let mut edge_counter = ir.edge_count();

        for op in ops {
            match op {
                Op::AddNode {
                    node_id,
                    node_type,
                    params,
                } => {
                    let schema = self
                        .schema_store
                        .get(node_type)
                        .ok_or_else(|| CodevError::SchemaMissing(node_type.clone()))?;
                    let node = instantiate_node(&schema, node_id, params, ir.node_count());
                    ir.push_node(node);
                }
                Op::SetParam {
                    node_id,
                    path,
                    value,
                } => {
                    let node = ir.node_mut(node_id).ok_or_else(|| {
                        CodevError::Structure(format!("SetParam on unknown node '{}'", node_id))
                    })?;
                    set_param(node, path, value.clone());
                }
                Op::Connect {
                    source_node_id,
                    source_anchor,
                    target_node_id,
                    target_anchor,
                } => {
                    let source_type = types.get(source_node_id).ok_or_else(|| {
                        CodevError::Structure(format!(
                            "Connect from unknown node '{}'",
                            source_node_id
                        ))
                    })?;
                    let target_type = types.get(target_node_id).ok_or_else(|| {
                        CodevError::Structure(format!(
                            "Connect to unknown node '{}'",
                            target_node_id
                        ))
                    })?;

                    let source_entry = self.resolve_anchor(
                        source_type,
                        source_anchor,
                        Direction::Output,
                        &mut metrics,
                    )?;
                    let target_entry = self.resolve_anchor(
                        target_type,
                        target_anchor,
                        Direction::Input,
                        &mut metrics,
                    )?;

                    ir.push_edge(json!({
                        "source": source_node_id,
                        "sourceHandle": source_entry.anchor_id(source_node_id),
                        "target": target_node_id,
                        "targetHandle": target_entry.anchor_id(target_node_id),
                        "id": format!("edge_{}", edge_counter),
                    }));
                    edge_counter += 1;
                }
                Op::BindCredential {
                    node_id,
                    credential_type,
                    credential_id,
                } => {
                    let record = self
                        .credential_store
                        .resolve_for_binding(credential_type, credential_id.as_deref())?;
                    let node = ir.node_mut(node_id).ok_or_else(|| {
                        CodevError::Structure(format!(
                            "BindCredential on unknown node '{}'",
                            node_id
                        ))
                    })?;
                    bind_credential(node, &record.id);
                }
            }
        }

        let flow_data = ir.to_flow_data();
        let payload_hash = canonical::payload_hash(&flow_data);
        let diff_summary = diff(&base_ir, &ir);

        Ok(CompiledPatch {
            flow_data,
            payload_hash,
            diff_summary,
            anchor_metrics: metrics,
            warnings,
        })
    }

    fn resolve_anchor(
        &self,
        node_type: &str,
        requested: &str,
        direction: Direction,
        metrics: &mut AnchorResolutionMetrics,
    ) -> Result<AnchorEntry> {
        if !self.anchor_store.knows_node_type(node_type) {
            return Err(CodevError::SchemaMissing(node_type.to_string()));
        }
        metrics.total_connections += 1;

        let exact = match direction {
            Direction::Output => self.anchor_store.resolve_output(node_type, requested),
            Direction::Input => self.anchor_store.resolve_input(node_type, requested),
        };
        if let Some(entry) = exact {
            metrics.exact_matches += 1;
            return Ok(entry);
        }

        let candidates = self.anchor_store.entries(
            node_type,
            match direction {
                Direction::Output => crate::knowledge::anchor_store::AnchorDirection::Output,
                Direction::Input => crate::knowledge::anchor_store::AnchorDirection::Input,
            },
        );

        if let Some(entry) = fuzzy_resolve(&candidates, requested) {
            metrics.fuzzy_fallbacks += 1;
            warn!(
                node_type = %node_type,
                requested = %requested,
                resolved = %entry.name,
                "Deprecated fuzzy anchor fallback used"
            );
            return Ok(entry);
        }

        let valid: Vec<String> = candidates.into_iter().map(|e| e.name).collect();
        Err(CodevError::Structure(format!(
            "no {} anchor '{}' on node type '{}'; valid names: [{}]",
            direction.label(),
            requested,
            node_type,
            valid.join(", ")
        )))
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Input,
    Output,
}

impl Direction {
    fn label(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Deprecated fallback ladder: case-insensitive name, type-name, CamelCase
/// token overlap, parent-type superset - in that order.
fn fuzzy_resolve(candidates: &[AnchorEntry], requested: &str) -> Option<AnchorEntry> {
    let requested_lower = requested.to_ascii_lowercase();

    // 1. case-insensitive name match
    if let Some(entry) = candidates
        .iter()
        .find(|e| e.name.to_ascii_lowercase() == requested_lower)
    {
        return Some(entry.clone());
    }

    // 2. type-name match (legacy sessions passed type names)
    if let Some(entry) = candidates.iter().find(|e| {
        e.compatible_types
            .iter()
            .any(|t| t.to_ascii_lowercase() == requested_lower)
    }) {
        return Some(entry.clone());
    }

    // 3. CamelCase token overlap on names
    let requested_tokens = camel_tokens(requested);
    if !requested_tokens.is_empty() {
        let mut best: Option<(usize, &AnchorEntry)> = None;
        for entry in candidates {
            let overlap = camel_tokens(&entry.name)
                .intersection(&requested_tokens)
                .count();
            if overlap > 0 && best.map(|(n, _)| overlap > n).unwrap_or(true) {
                best = Some((overlap, entry));
            }
        }
        if let Some((_, entry)) = best {
            return Some(entry.clone());
        }
    }

    // 4. parent-type superset: a compatible type that contains (or is
    // contained by) the requested token
    candidates
        .iter()
        .find(|e| {
            e.compatible_types.iter().any(|t| {
                let t = t.to_ascii_lowercase();
                t.ends_with(&requested_lower) || requested_lower.ends_with(&t)
            })
        })
        .cloned()
}

fn camel_tokens(name: &str) -> HashSet<String> {
    let mut tokens = HashSet::new();
    let mut current = String::new();
    for ch in name.chars() {
        if ch.is_uppercase() && !current.is_empty() {
            tokens.insert(current.to_ascii_lowercase());
            current = String::new();
        }
        if ch.is_alphanumeric() {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.insert(current.to_ascii_lowercase());
            current = String::new();
        }
    }
    if !current.is_empty() {
        tokens.insert(current.to_ascii_lowercase());
    }
    tokens
}

/// Instantiate a node from its schema: deep-copy the anchor/param sections
/// substituting `{nodeId}`, then seed `inputs` with schema defaults and the
/// op's params.
fn instantiate_node(schema: &NodeSchema, node_id: &str, params: &Value, position: usize) -> Value {
    let substitute = |template: &Option<String>, side: &str, name: &str, ty: &str| -> String {
        match template {
            Some(t) => t.replace("{nodeId}", node_id),
            None => format!("{}-{}-{}-{}", node_id, side, name, ty.replace(' ', "")),
        }
    };

    let input_anchors: Vec<Value> = schema
        .input_anchors
        .iter()
        .map(|a| {
            json!({
                "id": substitute(&a.id, "input", &a.name, &a.anchor_type),
                "name": a.name,
                "label": a.label,
                "type": a.anchor_type,
                "optional": a.optional,
            })
        })
        .collect();

    let input_params: Vec<Value> = schema
        .input_params
        .iter()
        .map(|p| {
            json!({
                "id": substitute(&p.id, "input", &p.name, &p.param_type),
                "name": p.name,
                "label": p.label,
                "type": p.param_type,
                "optional": p.optional,
            })
        })
        .collect();

    let output_anchors: Vec<Value> = schema
        .output_anchors
        .iter()
        .map(|a| {
            json!({
                "id": substitute(&a.id, "output", &a.name, &a.anchor_type),
                "name": a.name,
                "label": a.label,
                "type": a.anchor_type,
            })
        })
        .collect();

    let mut inputs = Map::new();
    for param in &schema.input_params {
        if let Some(default) = &param.default {
            inputs.insert(param.name.clone(), default.clone());
        }
    }
    if let Value::Object(overrides) = params {
        for (k, v) in overrides {
            inputs.insert(k.clone(), v.clone());
        }
    }

    json!({
        "id": node_id,
        "type": "customNode",
        "position": {"x": 280 * position as i64, "y": 120},
        "data": {
            "id": node_id,
            "name": schema.name,
            "label": schema.label,
            "version": schema.version,
            "category": schema.category,
            "baseClasses": schema.base_classes,
            "inputAnchors": input_anchors,
            "inputParams": input_params,
            "outputAnchors": output_anchors,
            "inputs": Value::Object(inputs),
            "outputs": {},
        }
    })
}

/// Write `value` at a dotted `path` under `data.inputs`. Writes targeting
/// the credential slot trigger dual binding.
fn set_param(node: &mut Value, path: &str, value: Value) {
    if path == "credential" {
        if let Some(id) = value.as_str() {
            bind_credential(node, id);
            return;
        }
    }

    if !node["data"]["inputs"].is_object() {
        node["data"]["inputs"] = json!({});
    }

    let mut cursor = &mut node["data"]["inputs"];
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            cursor[segment] = value;
            break;
        }
        if !cursor[segment].is_object() {
            cursor[segment] = json!({});
        }
        cursor = &mut cursor[segment];
    }
}

/// Rule of dual binding: the credential value must sit at both
/// `data.credential` and `data.inputs.credential`.
fn bind_credential(node: &mut Value, credential_id: &str) {
    node["data"]["credential"] = json!(credential_id);
    if !node["data"]["inputs"].is_object() {
        node["data"]["inputs"] = json!({});
    }
    node["data"]["inputs"]["credential"] = json!(credential_id);
}

fn diff(base: &GraphIR, result: &GraphIR) -> DiffSummary {
    let base_nodes: HashSet<String> = base.node_ids().into_iter().collect();
    let result_nodes: HashSet<String> = result.node_ids().into_iter().collect();

    let edge_key = |e: &Value| {
        format!(
            "{}|{}|{}|{}",
            e["source"].as_str().unwrap_or_default(),
            e["sourceHandle"].as_str().unwrap_or_default(),
            e["target"].as_str().unwrap_or_default(),
            e["targetHandle"].as_str().unwrap_or_default(),
        )
    };
    let base_edges: HashSet<String> = base.edges().iter().map(edge_key).collect();
    let result_edges: HashSet<String> = result.edges().iter().map(edge_key).collect();

    let mut changed_params = 0u32;
    for id in base_nodes.intersection(&result_nodes) {
        let before = &base.node(id).expect("in base")["data"];
        let after = &result.node(id).expect("in result")["data"];

        let empty = Map::new();
        let before_inputs = before["inputs"].as_object().unwrap_or(&empty);
        let after_inputs = after["inputs"].as_object().unwrap_or(&empty);
        for (key, after_value) in after_inputs {
            if before_inputs.get(key) != Some(after_value) {
                changed_params += 1;
            }
        }
        for key in before_inputs.keys() {
            if !after_inputs.contains_key(key) {
                changed_params += 1;
            }
        }
        if before["credential"] != after["credential"] {
            changed_params += 1;
        }
    }

    DiffSummary {
        added_nodes: result_nodes.difference(&base_nodes).count() as u32,
        removed_nodes: base_nodes.difference(&result_nodes).count() as u32,
        changed_params,
        added_edges: result_edges.difference(&base_edges).count() as u32,
        removed_edges: base_edges.difference(&result_edges).count() as u32,
    }
}

/// The write-guard identity check run at apply time: the payload about to
/// be written must hash to both the compile-time and validation-time
/// values.
pub fn verify_write_guard(
    compiled_graph: &Value,
    payload_hash: &str,
    validated_hash: &str,
) -> Result<()> {
    let actual = canonical::payload_hash(compiled_graph);
    if actual != payload_hash || actual != validated_hash {
        return Err(CodevError::WriteGuardMismatch {
            expected: validated_hash.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphir::test_fixtures::sample_flow;
    use crate::knowledge::anchor_store::AnchorDictionaryStore;
    use crate::knowledge::credential_store::{CredentialRecord, CredentialStore};
    use crate::knowledge::schema_store::test_fixtures::sample_store;
    use std::sync::Arc;

    struct Fixture {
        schema_store: Arc<NodeSchemaStore>,
        anchor_store: AnchorDictionaryStore,
        credential_store: CredentialStore,
    }

    impl Fixture {
        fn new() -> Self {
            let schema_store = Arc::new(sample_store());
            let anchor_store = AnchorDictionaryStore::new(Arc::clone(&schema_store));
            let credential_store = CredentialStore::from_records(vec![CredentialRecord {
                id: "cred-A".to_string(),
                name: "OpenAI".to_string(),
                credential_type: "openAIApi".to_string(),
            }]);
            Self {
                schema_store,
                anchor_store,
                credential_store,
            }
        }

        fn compiler(&self) -> PatchCompiler<'_> {
            PatchCompiler::new(&self.schema_store, &self.anchor_store, &self.credential_store)
        }
    }

    fn add(node_id: &str, node_type: &str) -> Op {
        Op::AddNode {
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            params: Value::Null,
        }
    }

    fn connect(source: &str, source_anchor: &str, target: &str, target_anchor: &str) -> Op {
        Op::Connect {
            source_node_id: source.to_string(),
            source_anchor: source_anchor.to_string(),
            target_node_id: target.to_string(),
            target_anchor: target_anchor.to_string(),
        }
    }

    #[test]
    fn empty_batch_is_identity() {
        let fixture = Fixture::new();
        let base = sample_flow();
        let compiled = fixture
            .compiler()
            .compile_patch_ops(&[], Some(&base))
            .unwrap();

        assert_eq!(compiled.payload_hash, canonical::payload_hash(&base));
        assert_eq!(compiled.diff_summary, DiffSummary::default());
    }

    #[test]
    fn create_chain_from_empty_base() {
        let fixture = Fixture::new();
        let ops = vec![
            add("chatOpenAI_0", "chatOpenAI"),
            add("conversationChain_0", "conversationChain"),
            connect("chatOpenAI_0", "chatOpenAI", "conversationChain_0", "model"),
        ];
        let compiled = fixture.compiler().compile_patch_ops(&ops, None).unwrap();

        crate::graphir::validate_flow_data(&compiled.flow_data).unwrap();
        assert_eq!(compiled.diff_summary.added_nodes, 2);
        assert_eq!(compiled.diff_summary.added_edges, 1);
        assert_eq!(compiled.anchor_metrics.fuzzy_fallbacks, 0);
        assert_eq!(compiled.anchor_metrics.exact_match_rate(), 1.0);

        let edge = &compiled.flow_data["edges"][0];
        assert_eq!(edge["id"], "edge_0");
        assert_eq!(
            edge["sourceHandle"],
            "chatOpenAI_0-output-chatOpenAI-ChatOpenAI|BaseChatModel"
        );
        assert_eq!(
            edge["targetHandle"],
            "conversationChain_0-input-model-BaseChatModel"
        );
    }

    #[test]
    fn schema_defaults_seed_inputs() {
        let fixture = Fixture::new();
        let compiled = fixture
            .compiler()
            .compile_patch_ops(&[add("chatOpenAI_0", "chatOpenAI")], None)
            .unwrap();
        assert_eq!(
            compiled.flow_data["nodes"][0]["data"]["inputs"]["modelName"],
            "gpt-4o"
        );
    }

    #[test]
    fn bind_credential_sets_both_slots() {
        let fixture = Fixture::new();
        let ops = vec![
            add("chatOpenAI_0", "chatOpenAI"),
            Op::BindCredential {
                node_id: "chatOpenAI_0".to_string(),
                credential_type: "openAIApi".to_string(),
                credential_id: None,
            },
        ];
        let compiled = fixture.compiler().compile_patch_ops(&ops, None).unwrap();
        let data = &compiled.flow_data["nodes"][0]["data"];
        assert_eq!(data["credential"], "cred-A");
        assert_eq!(data["inputs"]["credential"], "cred-A");
    }

    #[test]
    fn set_param_on_credential_slot_dual_binds() {
        let fixture = Fixture::new();
        let ops = vec![
            add("chatOpenAI_0", "chatOpenAI"),
            Op::SetParam {
                node_id: "chatOpenAI_0".to_string(),
                path: "credential".to_string(),
                value: json!("cred-A"),
            },
        ];
        let compiled = fixture.compiler().compile_patch_ops(&ops, None).unwrap();
        let data = &compiled.flow_data["nodes"][0]["data"];
        assert_eq!(data["credential"], "cred-A");
        assert_eq!(data["inputs"]["credential"], "cred-A");
    }

    #[test]
    fn nested_set_param_path() {
        let fixture = Fixture::new();
        let ops = vec![
            add("chatOpenAI_0", "chatOpenAI"),
            Op::SetParam {
                node_id: "chatOpenAI_0".to_string(),
                path: "modelKwargs.seed".to_string(),
                value: json!(42),
            },
        ];
        let compiled = fixture.compiler().compile_patch_ops(&ops, None).unwrap();
        assert_eq!(
            compiled.flow_data["nodes"][0]["data"]["inputs"]["modelKwargs"]["seed"],
            42
        );
    }

    #[test]
    fn unknown_node_type_signals_schema_repair() {
        let fixture = Fixture::new();
        let err = fixture
            .compiler()
            .compile_patch_ops(&[add("x_0", "ghostNode")], None)
            .unwrap_err();
        assert!(matches!(err, CodevError::SchemaMissing(t) if t == "ghostNode"));
    }

    #[test]
    fn unknown_anchor_lists_valid_names() {
        let fixture = Fixture::new();
        let ops = vec![
            add("chatOpenAI_0", "chatOpenAI"),
            add("conversationChain_0", "conversationChain"),
            connect("chatOpenAI_0", "chatOpenAI", "conversationChain_0", "nonsenseAnchor"),
        ];
        let err = fixture.compiler().compile_patch_ops(&ops, None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nonsenseAnchor"));
        assert!(msg.contains("model"));
        assert!(msg.contains("memory"));
    }

    #[test]
    fn fuzzy_type_name_match_counts_fallback() {
        let fixture = Fixture::new();
        // legacy callers passed the type name instead of the anchor name
        let ops = vec![
            add("chatOpenAI_0", "chatOpenAI"),
            add("conversationChain_0", "conversationChain"),
            connect(
                "chatOpenAI_0",
                "BaseChatModel",
                "conversationChain_0",
                "model",
            ),
        ];
        let compiled = fixture.compiler().compile_patch_ops(&ops, None).unwrap();
        assert_eq!(compiled.anchor_metrics.fuzzy_fallbacks, 1);
        assert_eq!(compiled.anchor_metrics.exact_matches, 1);
        assert!(compiled.anchor_metrics.exact_match_rate() < 1.0);
    }

    #[test]
    fn case_insensitive_fallback_resolves() {
        let fixture = Fixture::new();
        let ops = vec![
            add("chatOpenAI_0", "chatOpenAI"),
            add("conversationChain_0", "conversationChain"),
            connect("chatOpenAI_0", "chatopenai", "conversationChain_0", "MODEL"),
        ];
        let compiled = fixture.compiler().compile_patch_ops(&ops, None).unwrap();
        assert_eq!(compiled.anchor_metrics.fuzzy_fallbacks, 2);
    }

    #[test]
    fn update_changes_param_counts() {
        let fixture = Fixture::new();
        let base = sample_flow();
        let ops = vec![Op::SetParam {
            node_id: "chatOpenAI_0".to_string(),
            path: "modelName".to_string(),
            value: json!("gpt-4o-mini"),
        }];
        let compiled = fixture
            .compiler()
            .compile_patch_ops(&ops, Some(&base))
            .unwrap();
        assert_eq!(compiled.diff_summary.changed_params, 1);
        assert_eq!(compiled.diff_summary.added_nodes, 0);
        assert_eq!(compiled.diff_summary.added_edges, 0);
    }

    #[test]
    fn added_unconnected_node_has_zero_edge_changes() {
        let fixture = Fixture::new();
        let base = sample_flow();
        let ops = vec![add("bufferMemory_0", "bufferMemory")];
        let compiled = fixture
            .compiler()
            .compile_patch_ops(&ops, Some(&base))
            .unwrap();
        assert_eq!(compiled.diff_summary.added_nodes, 1);
        assert_eq!(compiled.diff_summary.added_edges, 0);
        assert_eq!(compiled.diff_summary.removed_edges, 0);
    }

    #[test]
    fn edge_ids_continue_from_base() {
        let fixture = Fixture::new();
        let base = sample_flow();
        let ops = vec![
            add("bufferMemory_0", "bufferMemory"),
            connect(
                "bufferMemory_0",
                "bufferMemory",
                "conversationChain_0",
                "memory",
            ),
        ];
        let compiled = fixture
            .compiler()
            .compile_patch_ops(&ops, Some(&base))
            .unwrap();
        assert_eq!(compiled.flow_data["edges"][1]["id"], "edge_1");
    }

    #[test]
    fn write_guard_accepts_identity_and_rejects_mutation() {
        let fixture = Fixture::new();
        let compiled = fixture
            .compiler()
            .compile_patch_ops(&[add("chatOpenAI_0", "chatOpenAI")], None)
            .unwrap();

        verify_write_guard(
            &compiled.flow_data,
            &compiled.payload_hash,
            &compiled.payload_hash,
        )
        .unwrap();

        let mut mutated = compiled.flow_data.clone();
        mutated["nodes"][0]["data"]["inputs"]["modelName"] = json!("tampered");
        let err = verify_write_guard(&mutated, &compiled.payload_hash, &compiled.payload_hash)
            .unwrap_err();
        assert!(matches!(err, CodevError::WriteGuardMismatch { .. }));
    }

    #[test]
    fn camel_tokens_split() {
        let tokens = camel_tokens("chatOpenAI");
        assert!(tokens.contains("chat"));
        assert!(tokens.contains("open"));
    }
}
