//! Node-schema snapshot store
//!
//! Local-first: schemas load from a snapshot file written out-of-band by
//! the snapshot refresher, with a sibling `.meta.json` carrying the
//! fingerprint. During a session the snapshot is read-only; the only
//! mutation is the scoped repair path, which inserts a single schema
//! fetched from the platform and recomputes the fingerprint.

use crate::canonical;
use crate::error::{CodevError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// An input or output port declaration in a node schema.
///
/// `id` is a template embedding `{nodeId}`; instantiation substitutes the
/// concrete node id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorSpec {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub anchor_type: String,
    #[serde(default)]
    pub optional: bool,
    /// Id template, e.g. `{nodeId}-input-memory-BaseMemory`
    #[serde(default)]
    pub id: Option<String>,
}

/// A scalar parameter declaration in a node schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub param_type: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Schema of one platform node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSchema {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "baseClasses", default)]
    pub base_classes: Vec<String>,
    #[serde(rename = "inputAnchors", default)]
    pub input_anchors: Vec<AnchorSpec>,
    #[serde(rename = "inputParams", default)]
    pub input_params: Vec<ParamSpec>,
    #[serde(rename = "outputAnchors", default)]
    pub output_anchors: Vec<AnchorSpec>,
}

#[derive(Debug, Deserialize)]
struct SnapshotMeta {
    fingerprint: String,
    #[allow(dead_code)]
    generated_at: Option<String>,
    node_count: Option<usize>,
}

struct Inner {
    by_type: HashMap<String, NodeSchema>,
    fingerprint: String,
}

/// O(1) schema lookup by node type, plus the snapshot fingerprint.
pub struct NodeSchemaStore {
    inner: RwLock<Inner>,
    /// Bumped on every repair insert; the anchor dictionary watches this to
    /// invalidate its derived indices
    generation: std::sync::atomic::AtomicU64,
}

impl NodeSchemaStore {
    /// Load the snapshot file and its sibling `.meta.json`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let schemas: Vec<NodeSchema> = serde_json::from_slice(&bytes)?;

        let meta_path = path.with_extension("meta.json");
        let computed = canonical::sha256_hex(&bytes);
        let fingerprint = match std::fs::read(&meta_path) {
            Ok(meta_bytes) => {
                let meta: SnapshotMeta = serde_json::from_slice(&meta_bytes)?;
                if meta.fingerprint != computed {
                    warn!(
                        path = %meta_path.display(),
                        "Snapshot meta fingerprint does not match snapshot bytes; using computed value"
                    );
                    computed
                } else {
                    if let Some(count) = meta.node_count {
                        if count != schemas.len() {
                            warn!(
                                expected = count,
                                actual = schemas.len(),
                                "Snapshot meta node_count mismatch"
                            );
                        }
                    }
                    meta.fingerprint
                }
            }
            Err(_) => computed,
        };

        info!(
            node_count = schemas.len(),
            fingerprint = %fingerprint,
            "Loaded node-schema snapshot"
        );
        Ok(Self::from_parts(schemas, fingerprint))
    }

    /// Build directly from schemas; fingerprint computed over the canonical
    /// serialization. Test and repair helper.
    pub fn from_schemas(schemas: Vec<NodeSchema>) -> Self {
        let fingerprint = Self::fingerprint_of(&schemas);
        Self::from_parts(schemas, fingerprint)
    }

    fn from_parts(schemas: Vec<NodeSchema>, fingerprint: String) -> Self {
        let by_type = schemas.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self {
            inner: RwLock::new(Inner {
                by_type,
                fingerprint,
            }),
            generation: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn fingerprint_of(schemas: &[NodeSchema]) -> String {
        let mut sorted: Vec<&NodeSchema> = schemas.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let value = serde_json::to_value(&sorted).expect("schemas serialize");
        canonical::payload_hash(&value)
    }

    pub fn get(&self, node_type: &str) -> Option<NodeSchema> {
        self.inner.read().by_type.get(node_type).cloned()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.inner.read().by_type.contains_key(node_type)
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().by_type.len()
    }

    pub fn node_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().by_type.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn fingerprint(&self) -> String {
        self.inner.read().fingerprint.clone()
    }

    /// Monotonic counter bumped on every repair; derived views compare it
    /// to decide whether their indices are stale.
    pub fn generation(&self) -> u64 {
        self.generation.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Scoped repair: parse and insert a single schema fetched from the
    /// platform, then recompute the fingerprint.
    pub fn repair_insert(&self, schema_json: &Value) -> Result<NodeSchema> {
        let schema: NodeSchema = serde_json::from_value(schema_json.clone())
            .map_err(|e| CodevError::Structure(format!("unparseable node schema: {}", e)))?;

        let mut inner = self.inner.write();
        info!(node_type = %schema.name, "Repair-inserting node schema");
        inner.by_type.insert(schema.name.clone(), schema.clone());
        let schemas: Vec<NodeSchema> = inner.by_type.values().cloned().collect();
        inner.fingerprint = Self::fingerprint_of(&schemas);
        drop(inner);

        self.generation
            .fetch_add(1, std::sync::atomic::Ordering::Release);
        Ok(schema)
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use serde_json::json;

    /// A small but realistic schema set used across the crate's tests.
    pub fn sample_schemas() -> Vec<NodeSchema> {
        serde_json::from_value(json!([
            {
                "name": "chatOpenAI",
                "label": "ChatOpenAI",
                "version": 2,
                "category": "Chat Models",
                "baseClasses": ["ChatOpenAI", "BaseChatModel"],
                "inputAnchors": [
                    {"name": "cache", "label": "Cache", "type": "BaseCache", "optional": true,
                     "id": "{nodeId}-input-cache-BaseCache"},
                    {"name": "memory", "label": "Memory", "type": "BaseMemory", "optional": true,
                     "id": "{nodeId}-input-memory-BaseMemory"}
                ],
                "inputParams": [
                    {"name": "modelName", "label": "Model Name", "type": "string",
                     "default": "gpt-4o", "id": "{nodeId}-input-modelName-string"},
                    {"name": "credential", "label": "Connect Credential", "type": "credential",
                     "optional": true, "id": "{nodeId}-input-credential-credential"}
                ],
                "outputAnchors": [
                    {"name": "chatOpenAI", "label": "ChatOpenAI",
                     "type": "ChatOpenAI | BaseChatModel",
                     "id": "{nodeId}-output-chatOpenAI-ChatOpenAI|BaseChatModel"}
                ]
            },
            {
                "name": "bufferMemory",
                "label": "Buffer Memory",
                "version": 1,
                "category": "Memory",
                "baseClasses": ["BufferMemory", "BaseMemory"],
                "inputAnchors": [],
                "inputParams": [
                    {"name": "sessionId", "label": "Session Id", "type": "string", "optional": true}
                ],
                "outputAnchors": [
                    {"name": "bufferMemory", "label": "BufferMemory",
                     "type": "BufferMemory | BaseMemory",
                     "id": "{nodeId}-output-bufferMemory-BufferMemory|BaseMemory"}
                ]
            },
            {
                "name": "conversationChain",
                "label": "Conversation Chain",
                "version": 1,
                "category": "Chains",
                "baseClasses": ["ConversationChain", "BaseChain"],
                "inputAnchors": [
                    {"name": "model", "label": "Chat Model", "type": "BaseChatModel",
                     "id": "{nodeId}-input-model-BaseChatModel"},
                    {"name": "memory", "label": "Memory", "type": "BaseMemory", "optional": true,
                     "id": "{nodeId}-input-memory-BaseMemory"}
                ],
                "inputParams": [],
                "outputAnchors": [
                    {"name": "conversationChain", "label": "ConversationChain",
                     "type": "ConversationChain | BaseChain",
                     "id": "{nodeId}-output-conversationChain-ConversationChain|BaseChain"}
                ]
            }
        ]))
        .expect("fixture schemas parse")
    }

    pub fn sample_store() -> NodeSchemaStore {
        NodeSchemaStore::from_schemas(sample_schemas())
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_by_node_type() {
        let store = sample_store();
        assert_eq!(store.node_count(), 3);
        assert!(store.contains("chatOpenAI"));
        assert!(!store.contains("ghostNode"));

        let schema = store.get("conversationChain").unwrap();
        assert_eq!(schema.input_anchors.len(), 2);
        assert_eq!(schema.base_classes, vec!["ConversationChain", "BaseChain"]);
    }

    #[test]
    fn repair_insert_changes_fingerprint_and_generation() {
        let store = sample_store();
        let before = store.fingerprint();
        let gen_before = store.generation();

        store
            .repair_insert(&json!({
                "name": "serpAPI",
                "label": "Serp API",
                "version": 1,
                "category": "Tools",
                "baseClasses": ["SerpAPI", "Tool"],
                "inputAnchors": [],
                "inputParams": [],
                "outputAnchors": [
                    {"name": "serpAPI", "type": "SerpAPI | Tool",
                     "id": "{nodeId}-output-serpAPI-SerpAPI|Tool"}
                ]
            }))
            .unwrap();

        assert!(store.contains("serpAPI"));
        assert_ne!(store.fingerprint(), before);
        assert_eq!(store.generation(), gen_before + 1);
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let mut schemas = sample_schemas();
        let a = NodeSchemaStore::from_schemas(schemas.clone());
        schemas.reverse();
        let b = NodeSchemaStore::from_schemas(schemas);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.snapshot.json");
        let bytes = serde_json::to_vec(&sample_schemas()).unwrap();
        std::fs::write(&path, &bytes).unwrap();
        std::fs::write(
            dir.path().join("nodes.snapshot.meta.json"),
            serde_json::to_vec(&json!({
                "fingerprint": crate::canonical::sha256_hex(&bytes),
                "generated_at": "2025-06-01T00:00:00Z",
                "node_count": 3
            }))
            .unwrap(),
        )
        .unwrap();

        let store = NodeSchemaStore::load_from_file(&path).unwrap();
        assert_eq!(store.node_count(), 3);
        assert_eq!(store.fingerprint(), crate::canonical::sha256_hex(&bytes));
    }
}
