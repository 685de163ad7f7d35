//! Redacted credential index
//!
//! Indexes platform credentials by id, name and credential type. The
//! snapshot and the platform listing are both redacted upstream; this
//! store never sees or exposes encrypted data. A cache miss can be
//! repaired by re-listing from the platform.

use crate::error::{CodevError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// One credential, metadata only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: String,
    pub name: String,
    /// Platform credential type, e.g. `openAIApi`
    #[serde(rename = "credentialName")]
    pub credential_type: String,
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<String, CredentialRecord>,
    by_name: HashMap<String, String>,
    by_type: HashMap<String, Vec<String>>,
}

impl Inner {
    fn rebuild(records: Vec<CredentialRecord>) -> Self {
        let mut inner = Self::default();
        for record in records {
            inner
                .by_name
                .insert(record.name.clone(), record.id.clone());
            inner
                .by_type
                .entry(record.credential_type.clone())
                .or_default()
                .push(record.id.clone());
            inner.by_id.insert(record.id.clone(), record);
        }
        inner
    }
}

/// Credential metadata index.
#[derive(Default)]
pub struct CredentialStore {
    inner: RwLock<Inner>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<CredentialRecord>) -> Self {
        Self {
            inner: RwLock::new(Inner::rebuild(records)),
        }
    }

    /// Load the redacted snapshot file. A missing file yields an empty
    /// store; the platform listing repairs it later.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let records: Vec<CredentialRecord> = serde_json::from_slice(&bytes)?;
                info!(count = records.len(), "Loaded credential snapshot");
                Ok(Self::from_records(records))
            }
            Err(_) => Ok(Self::new()),
        }
    }

    /// Replace the index with a fresh platform listing.
    pub fn refresh(&self, listing: &Value) -> Result<usize> {
        let records: Vec<CredentialRecord> = serde_json::from_value(listing.clone())?;
        let count = records.len();
        *self.inner.write() = Inner::rebuild(records);
        Ok(count)
    }

    pub fn get(&self, id: &str) -> Option<CredentialRecord> {
        self.inner.read().by_id.get(id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<CredentialRecord> {
        let inner = self.inner.read();
        inner
            .by_name
            .get(name)
            .and_then(|id| inner.by_id.get(id))
            .cloned()
    }

    pub fn find_by_type(&self, credential_type: &str) -> Vec<CredentialRecord> {
        let inner = self.inner.read();
        inner
            .by_type
            .get(credential_type)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.by_id.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve for binding: explicit id wins; otherwise the type must match
    /// exactly one credential.
    pub fn resolve_for_binding(
        &self,
        credential_type: &str,
        credential_id: Option<&str>,
    ) -> Result<CredentialRecord> {
        if let Some(id) = credential_id {
            return self.get(id).ok_or_else(|| {
                CodevError::Credential(format!("no credential with id '{}'", id))
            });
        }

        let matches = self.find_by_type(credential_type);
        match matches.len() {
            0 => Err(CodevError::Credential(format!(
                "no credential of type '{}'",
                credential_type
            ))),
            1 => Ok(matches.into_iter().next().expect("length checked")),
            n => Err(CodevError::Credential(format!(
                "{} credentials of type '{}'; an explicit id is required",
                n, credential_type
            ))),
        }
    }

    pub fn types_present(&self) -> Vec<String> {
        let mut types: Vec<String> = self.inner.read().by_type.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
