//! Marketplace template index
//!
//! Templates carry full `flow_data` payloads that are expensive to ship
//! through prompts; the list view strips them and keeps only metadata.

use crate::error::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A marketplace template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Full graph payload; absent in list views
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_data: Option<Value>,
}

impl Template {
    /// Metadata-only copy for listings.
    pub fn list_view(&self) -> Template {
        Template {
            flow_data: None,
            ..self.clone()
        }
    }
}

/// In-memory template index, refreshed from the platform listing.
#[derive(Default)]
pub struct TemplateStore {
    templates: RwLock<HashMap<String, Template>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh(&self, listing: &Value) -> Result<usize> {
        let templates: Vec<Template> = serde_json::from_value(listing.clone())?;
        let count = templates.len();
        *self.templates.write() = templates
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        Ok(count)
    }

    /// All templates with `flow_data` stripped.
    pub fn list(&self) -> Vec<Template> {
        let mut items: Vec<Template> = self
            .templates
            .read()
            .values()
            .map(Template::list_view)
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    /// Full template including `flow_data`.
    pub fn get(&self, id: &str) -> Option<Template> {
        self.templates.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
