//! Knowledge layer: local-first stores the agent reasons against
//!
//! - [`schema_store`] - node-schema snapshot with O(1) lookup by node type
//! - [`anchor_store`] - anchor dictionary derived from the schema store
//! - [`credential_store`] - redacted credential index
//! - [`template_store`] - marketplace templates, heavy payloads stripped
//!   from list views
//! - [`pattern_store`] - persistent library of previously-successful graphs

pub mod anchor_store;
pub mod credential_store;
pub mod pattern_store;
pub mod schema_store;
pub mod template_store;

pub use anchor_store::{AnchorDirection, AnchorDictionaryStore, AnchorEntry, IdSource};
pub use credential_store::{CredentialRecord, CredentialStore};
pub use pattern_store::{NewPattern, Pattern, PatternStore, SqlitePatternStore};
pub use schema_store::{NodeSchema, NodeSchemaStore};
pub use template_store::{Template, TemplateStore};
