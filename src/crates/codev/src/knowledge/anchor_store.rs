//! Anchor dictionary derived from the node-schema store
//!
//! The dictionary is a rebuildable view: three indices (`by_node_type`,
//! `by_anchor_name`, `by_type_token`) built lazily from the schema store
//! and invalidated whenever the store's generation counter moves (i.e.
//! after a schema repair). Anchor resolution during compilation goes
//! through this store exclusively, so anchor ids are always derived from
//! schema-provided templates, never invented by the model.

use crate::knowledge::schema_store::{AnchorSpec, NodeSchema, NodeSchemaStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Which side of a node an anchor sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorDirection {
    Input,
    Output,
}

/// Where an anchor's id template came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    /// Template taken verbatim from the schema snapshot
    Schema,
    /// Template synthesized because the schema omitted an id
    Fabricated,
}

/// One resolvable anchor on a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorEntry {
    pub node_type: String,
    pub direction: AnchorDirection,
    pub name: String,
    pub label: String,
    /// Raw type expression, e.g. `"ChatOpenAI | BaseChatModel"`
    pub anchor_type: String,
    /// Id template embedding `{nodeId}`
    pub id_template: String,
    /// Individual type tokens the anchor is compatible with
    pub compatible_types: Vec<String>,
    pub optional: bool,
    pub id_source: IdSource,
}

impl AnchorEntry {
    fn from_spec(node_type: &str, direction: AnchorDirection, spec: &AnchorSpec) -> Self {
        let (id_template, id_source) = match &spec.id {
            Some(id) => (id.clone(), IdSource::Schema),
            None => {
                let side = match direction {
                    AnchorDirection::Input => "input",
                    AnchorDirection::Output => "output",
                };
                let type_part = spec.anchor_type.replace(' ', "");
                (
                    format!("{{nodeId}}-{}-{}-{}", side, spec.name, type_part),
                    IdSource::Fabricated,
                )
            }
        };

        Self {
            node_type: node_type.to_string(),
            direction,
            name: spec.name.clone(),
            label: spec.label.clone(),
            anchor_type: spec.anchor_type.clone(),
            id_template,
            compatible_types: spec
                .anchor_type
                .split('|')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            optional: spec.optional,
            id_source,
        }
    }

    /// Concrete anchor id for a node instance.
    pub fn anchor_id(&self, node_id: &str) -> String {
        self.id_template.replace("{nodeId}", node_id)
    }
}

#[derive(Default)]
struct Indices {
    /// (node_type, direction) -> entries in schema order
    by_node_type: HashMap<(String, AnchorDirection), Vec<AnchorEntry>>,
    /// anchor name -> entries across all node types
    by_anchor_name: HashMap<String, Vec<AnchorEntry>>,
    /// lowercase type token -> entries accepting or producing that type
    by_type_token: HashMap<String, Vec<AnchorEntry>>,
}

impl Indices {
    fn build(schemas: &[NodeSchema]) -> Self {
        let mut indices = Self::default();
        for schema in schemas {
            for spec in &schema.input_anchors {
                indices.insert(AnchorEntry::from_spec(
                    &schema.name,
                    AnchorDirection::Input,
                    spec,
                ));
            }
            for spec in &schema.output_anchors {
                indices.insert(AnchorEntry::from_spec(
                    &schema.name,
                    AnchorDirection::Output,
                    spec,
                ));
            }
        }
        indices
    }

    fn insert(&mut self, entry: AnchorEntry) {
        self.by_anchor_name
            .entry(entry.name.clone())
            .or_default()
            .push(entry.clone());
        for token in &entry.compatible_types {
            self.by_type_token
                .entry(token.to_ascii_lowercase())
                .or_default()
                .push(entry.clone());
        }
        self.by_node_type
            .entry((entry.node_type.clone(), entry.direction))
            .or_default()
            .push(entry);
    }
}

/// Derived, lazily-rebuilt anchor dictionary.
pub struct AnchorDictionaryStore {
    schema_store: Arc<NodeSchemaStore>,
    cache: RwLock<Option<(u64, Arc<Indices>)>>,
}

impl AnchorDictionaryStore {
    pub fn new(schema_store: Arc<NodeSchemaStore>) -> Self {
        Self {
            schema_store,
            cache: RwLock::new(None),
        }
    }

    fn indices(&self) -> Arc<Indices> {
        let generation = self.schema_store.generation();
        if let Some((cached_gen, indices)) = self.cache.read().as_ref() {
            if *cached_gen == generation {
                return Arc::clone(indices);
            }
        }

        let schemas: Vec<NodeSchema> = self
            .schema_store
            .node_types()
            .into_iter()
            .filter_map(|name| self.schema_store.get(&name))
            .collect();
        let built = Arc::new(Indices::build(&schemas));
        *self.cache.write() = Some((generation, Arc::clone(&built)));
        built
    }

    /// Drop the derived indices; the next lookup rebuilds them.
    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    /// Exact lookup of an output anchor by canonical name.
    pub fn resolve_output(&self, node_type: &str, name: &str) -> Option<AnchorEntry> {
        self.entries(node_type, AnchorDirection::Output)
            .into_iter()
            .find(|e| e.name == name)
    }

    /// Exact lookup of an input anchor by canonical name.
    pub fn resolve_input(&self, node_type: &str, name: &str) -> Option<AnchorEntry> {
        self.entries(node_type, AnchorDirection::Input)
            .into_iter()
            .find(|e| e.name == name)
    }

    /// All anchors on one side of a node type, in schema order.
    pub fn entries(&self, node_type: &str, direction: AnchorDirection) -> Vec<AnchorEntry> {
        self.indices()
            .by_node_type
            .get(&(node_type.to_string(), direction))
            .cloned()
            .unwrap_or_default()
    }

    /// Entries across node types sharing an anchor name.
    pub fn by_anchor_name(&self, name: &str) -> Vec<AnchorEntry> {
        self.indices()
            .by_anchor_name
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Entries compatible with a type token (case-insensitive).
    pub fn by_type_token(&self, token: &str) -> Vec<AnchorEntry> {
        self.indices()
            .by_type_token
            .get(&token.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn input_names(&self, node_type: &str) -> Vec<String> {
        self.entries(node_type, AnchorDirection::Input)
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    pub fn output_names(&self, node_type: &str) -> Vec<String> {
        self.entries(node_type, AnchorDirection::Output)
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    /// Whether the backing schema store knows this node type at all.
    pub fn knows_node_type(&self, node_type: &str) -> bool {
        self.schema_store.contains(node_type)
    }
}
