//! Patch intermediate representation
//!
//! Plan compilation emits an ordered batch of [`Op`] values; the patch
//! compiler consumes them. `node_id` is a caller-chosen opaque identifier
//! stable within a single batch: a `Connect` may reference either a node
//! already in the base graph or a prior `AddNode` in the same batch.
//!
//! [`validate_patch_ops`] is the pre-compile lint: it rejects duplicate
//! ids and dangling references outright, and (when an anchor dictionary is
//! supplied) warns on anchor names not present on the target node type,
//! listing the valid options.

use crate::error::{CodevError, Result};
use crate::knowledge::anchor_store::AnchorDictionaryStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// One edit operation in the patch IR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Instantiate a node of `node_type` under the caller-chosen `node_id`.
    AddNode {
        node_id: String,
        node_type: String,
        #[serde(default)]
        params: Value,
    },
    /// Write `value` at `path` under the node's `data.inputs`.
    SetParam {
        node_id: String,
        path: String,
        value: Value,
    },
    /// Connect an output anchor to an input anchor by canonical anchor name.
    Connect {
        source_node_id: String,
        source_anchor: String,
        target_node_id: String,
        target_anchor: String,
    },
    /// Bind a credential to a node, by explicit id or by type lookup.
    BindCredential {
        node_id: String,
        credential_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credential_id: Option<String>,
    },
}

impl Op {
    /// Node ids this op references (not the ones it introduces).
    pub fn referenced_node_ids(&self) -> Vec<&str> {
        match self {
            Op::AddNode { .. } => vec![],
            Op::SetParam { node_id, .. } | Op::BindCredential { node_id, .. } => vec![node_id],
            Op::Connect {
                source_node_id,
                target_node_id,
                ..
            } => vec![source_node_id, target_node_id],
        }
    }
}

/// Parse a JSON array (as emitted by plan compilation) into an op batch.
pub fn parse_ops(value: &Value) -> Result<Vec<Op>> {
    Ok(serde_json::from_value(value.clone())?)
}

/// Pre-compile lint over an op batch.
///
/// `node_type_map` maps known node ids (base graph plus this batch's
/// `AddNode`s) to their node types. Returns the accumulated warnings;
/// structural violations are errors.
pub fn validate_patch_ops(
    ops: &[Op],
    node_type_map: &HashMap<String, String>,
    anchor_store: Option<&AnchorDictionaryStore>,
) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let mut known: HashSet<&str> = node_type_map.keys().map(String::as_str).collect();
    let mut added_in_batch: HashSet<&str> = HashSet::new();

    for op in ops {
        if let Op::AddNode { node_id, .. } = op {
            if !added_in_batch.insert(node_id.as_str()) {
                return Err(CodevError::Structure(format!(
                    "DUPLICATE_NODE_ID: '{}' added twice in one batch",
                    node_id
                )));
            }
            if known.contains(node_id.as_str()) {
                return Err(CodevError::Structure(format!(
                    "DUPLICATE_NODE_ID: '{}' already exists in the base graph",
                    node_id
                )));
            }
            known.insert(node_id.as_str());
        }

        for referenced in op.referenced_node_ids() {
            if !known.contains(referenced) {
                return Err(CodevError::Structure(format!(
                    "DANGLING_REF: '{}' is neither in the base graph nor added earlier in the batch",
                    referenced
                )));
            }
        }
    }

    // anchor-name sanity, advisory only at this stage
    if let Some(store) = anchor_store {
        // node types introduced by this batch
        let mut types: HashMap<&str, &str> = node_type_map
            .iter()
            .map(|(id, ty)| (id.as_str(), ty.as_str()))
            .collect();
        for op in ops {
            if let Op::AddNode {
                node_id, node_type, ..
            } = op
            {
                types.insert(node_id.as_str(), node_type.as_str());
            }
        }

        for op in ops {
            if let Op::Connect {
                source_node_id,
                source_anchor,
                target_node_id,
                target_anchor,
            } = op
            {
                if let Some(node_type) = types.get(source_node_id.as_str()) {
                    if store.resolve_output(node_type, source_anchor).is_none() {
                        warnings.push(format!(
                            "unknown output anchor '{}' on {} ({}); valid: [{}]",
                            source_anchor,
                            source_node_id,
                            node_type,
                            store.output_names(node_type).join(", ")
                        ));
                    }
                }
                if let Some(node_type) = types.get(target_node_id.as_str()) {
                    if store.resolve_input(node_type, target_anchor).is_none() {
                        warnings.push(format!(
                            "unknown input anchor '{}' on {} ({}); valid: [{}]",
                            target_anchor,
                            target_node_id,
                            node_type,
                            store.input_names(node_type).join(", ")
                        ));
                    }
                }
            }
        }
    }

    Ok(warnings)
}
