//! Indexed view over a graph payload, and the post-compile validator
//!
//! A graph payload is `{"nodes": [...], "edges": [...]}` where nodes and
//! edges reference each other only through opaque string ids; neither side
//! owns the other. [`GraphIR`] keeps the payload in insertion order (the
//! order the platform renders) while offering id-keyed access for the
//! compiler.

use crate::error::{CodevError, Result};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Mutable, indexed working form of a graph payload.
#[derive(Debug, Clone, Default)]
pub struct GraphIR {
    nodes: Vec<Value>,
    edges: Vec<Value>,
}

impl GraphIR {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a platform graph payload. Missing `nodes`/`edges` keys read as
    /// empty, matching the platform's minimum shape.
    pub fn from_flow_data(flow_data: &Value) -> Result<Self> {
        let nodes = match flow_data.get("nodes") {
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(CodevError::Structure(
                    "flow_data.nodes must be an array".to_string(),
                ))
            }
            None => Vec::new(),
        };
        let edges = match flow_data.get("edges") {
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(CodevError::Structure(
                    "flow_data.edges must be an array".to_string(),
                ))
            }
            None => Vec::new(),
        };
        Ok(Self { nodes, edges })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[Value] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Value] {
        &self.edges
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: &str) -> Option<&Value> {
        self.nodes.iter().find(|n| n["id"] == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Value> {
        self.nodes.iter_mut().find(|n| n["id"] == id)
    }

    /// The platform node type (`data.name`) of a node instance.
    pub fn node_type_of(&self, id: &str) -> Option<String> {
        self.node(id)
            .and_then(|n| n["data"]["name"].as_str())
            .map(str::to_string)
    }

    /// `node id -> node type` for every node in the graph.
    pub fn node_type_map(&self) -> HashMap<String, String> {
        self.nodes
            .iter()
            .filter_map(|n| {
                let id = n["id"].as_str()?;
                let ty = n["data"]["name"].as_str()?;
                Some((id.to_string(), ty.to_string()))
            })
            .collect()
    }

    pub fn push_node(&mut self, node: Value) {
        self.nodes.push(node);
    }

    pub fn push_edge(&mut self, edge: Value) {
        self.edges.push(edge);
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter_map(|n| n["id"].as_str().map(str::to_string))
            .collect()
    }

    /// Serialize back into the platform payload shape.
    pub fn to_flow_data(&self) -> Value {
        json!({
            "nodes": self.nodes,
            "edges": self.edges,
        })
    }
}

fn anchor_ids(node: &Value, key: &str) -> Vec<String> {
    node["data"][key]
        .as_array()
        .map(|anchors| {
            anchors
                .iter()
                .filter_map(|a| a["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Post-compile structural validation of a graph payload.
///
/// Checks the full platform contract: required `data` sections on every
/// node, unique node and edge ids, and edge endpoints that reference
/// existing nodes through anchor ids those nodes actually carry.
pub fn validate_flow_data(flow_data: &Value) -> Result<()> {
    let ir = GraphIR::from_flow_data(flow_data)?;

    let mut node_ids = HashSet::new();
    for node in ir.nodes() {
        let id = node["id"].as_str().ok_or_else(|| {
            CodevError::Structure("node missing string 'id'".to_string())
        })?;
        if !node_ids.insert(id.to_string()) {
            return Err(CodevError::Structure(format!("duplicate node id '{}'", id)));
        }

        let data = node.get("data").and_then(Value::as_object).ok_or_else(|| {
            CodevError::Structure(format!("node '{}' missing 'data' object", id))
        })?;
        for section in ["inputAnchors", "inputParams", "outputAnchors"] {
            if !data.get(section).map(Value::is_array).unwrap_or(false) {
                return Err(CodevError::Structure(format!(
                    "node '{}' missing data.{}",
                    id, section
                )));
            }
        }
        if !data.contains_key("outputs") {
            return Err(CodevError::Structure(format!(
                "node '{}' missing data.outputs",
                id
            )));
        }
    }

    let mut edge_ids = HashSet::new();
    for edge in ir.edges() {
        let edge_id = edge["id"].as_str().unwrap_or_default();
        if !edge_id.is_empty() && !edge_ids.insert(edge_id.to_string()) {
            return Err(CodevError::Structure(format!(
                "duplicate edge id '{}'",
                edge_id
            )));
        }

        let source = edge["source"].as_str().unwrap_or_default();
        let target = edge["target"].as_str().unwrap_or_default();
        for endpoint in [source, target] {
            if !node_ids.contains(endpoint) {
                return Err(CodevError::Structure(format!(
                    "edge '{}' references unknown node '{}'",
                    edge_id, endpoint
                )));
            }
        }

        let source_handle = edge["sourceHandle"].as_str().unwrap_or_default();
        let source_node = ir.node(source).expect("checked above");
        if !anchor_ids(source_node, "outputAnchors").contains(&source_handle.to_string()) {
            return Err(CodevError::Structure(format!(
                "edge '{}' sourceHandle '{}' is not an output anchor of '{}'",
                edge_id, source_handle, source
            )));
        }

        let target_handle = edge["targetHandle"].as_str().unwrap_or_default();
        let target_node = ir.node(target).expect("checked above");
        if !anchor_ids(target_node, "inputAnchors").contains(&target_handle.to_string()) {
            return Err(CodevError::Structure(format!(
                "edge '{}' targetHandle '{}' is not an input anchor of '{}'",
                edge_id, target_handle, target
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use serde_json::{json, Value};

    /// A structurally valid two-node graph: chatOpenAI feeding a
    /// conversationChain.
    pub fn sample_flow() -> Value {
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
                        "inputAnchors": [
                            {"id": "chatOpenAI_0-input-memory-BaseMemory", "name": "memory"}
                        ],
                        "inputParams": [
                            {"id": "chatOpenAI_0-input-modelName-string", "name": "modelName"}
                        ],
                        "outputAnchors": [
                            {"id": "chatOpenAI_0-output-chatOpenAI-ChatOpenAI|BaseChatModel",
                             "name": "chatOpenAI"}
                        ],
                        "inputs": {"modelName": "gpt-4o"},
                        "outputs": {}
                    }
                },
                {
                    "id": "conversationChain_0",
                    "type": "customNode",
                    "position": {"x": 300, "y": 0},
                    "data": {
                        "id": "conversationChain_0",
                        "name": "conversationChain",
                        "label": "Conversation Chain",
                        "inputAnchors": [
                            {"id": "conversationChain_0-input-model-BaseChatModel", "name": "model"},
                            {"id": "conversationChain_0-input-memory-BaseMemory", "name": "memory"}
                        ],
                        "inputParams": [],
                        "outputAnchors": [
                            {"id": "conversationChain_0-output-conversationChain-ConversationChain|BaseChain",
                             "name": "conversationChain"}
                        ],
                        "inputs": {},
                        "outputs": {}
                    }
                }
            ],
            "edges": [
                {
                    "source": "chatOpenAI_0",
                    "sourceHandle": "chatOpenAI_0-output-chatOpenAI-ChatOpenAI|BaseChatModel",
                    "target": "conversationChain_0",
                    "targetHandle": "conversationChain_0-input-model-BaseChatModel",
                    "id": "edge_0"
                }
            ]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::sample_flow;
    use super::*;

    #[test]
    fn sample_flow_is_valid() {
        validate_flow_data(&sample_flow()).unwrap();
    }

    #[test]
    fn graphir_indexes_by_id() {
        let ir = GraphIR::from_flow_data(&sample_flow()).unwrap();
        assert_eq!(ir.node_count(), 2);
        assert_eq!(ir.edge_count(), 1);
        assert_eq!(
            ir.node_type_of("conversationChain_0").as_deref(),
            Some("conversationChain")
        );
        assert!(ir.contains_node("chatOpenAI_0"));
        assert!(!ir.contains_node("ghost"));
    }

    #[test]
    fn duplicate_node_id_rejected() {
        let mut flow = sample_flow();
        let duplicate = flow["nodes"][0].clone();
        flow["nodes"].as_array_mut().unwrap().push(duplicate);
        assert!(validate_flow_data(&flow).is_err());
    }

    #[test]
    fn dangling_edge_rejected() {
        let mut flow = sample_flow();
        flow["edges"][0]["target"] = serde_json::json!("ghost");
        assert!(validate_flow_data(&flow).is_err());
    }

    #[test]
    fn wrong_anchor_handle_rejected() {
        let mut flow = sample_flow();
        flow["edges"][0]["targetHandle"] = serde_json::json!("conversationChain_0-input-ghost-X");
        let err = validate_flow_data(&flow).unwrap_err();
        assert!(err.to_string().contains("targetHandle"));
    }

    #[test]
    fn missing_outputs_section_rejected() {
        let mut flow = sample_flow();
        flow["nodes"][0]["data"]
            .as_object_mut()
            .unwrap()
            .remove("outputs");
        assert!(validate_flow_data(&flow).is_err());
    }

    #[test]
    fn minimum_shape_parses_as_empty() {
        let ir = GraphIR::from_flow_data(&serde_json::json!({})).unwrap();
        assert_eq!(ir.node_count(), 0);
        assert_eq!(ir.to_flow_data(), serde_json::json!({"nodes": [], "edges": []}));
    }
}
