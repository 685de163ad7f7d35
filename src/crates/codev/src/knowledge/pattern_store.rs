//! Self-improving pattern library
//!
//! Successful sessions deposit `(keywords, domain, node_types, category,
//! schema_fingerprint, flow_data)` tuples; planning searches them and may
//! seed compilation with a pattern's graph instead of building from
//! scratch. The store is an external collaborator behind the
//! [`PatternStore`] trait; [`SqlitePatternStore`] is the bundled backend.
//! All writes are best-effort from the session's point of view: a failed
//! pattern save logs and never aborts the session.

use crate::error::{CodevError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// A stored pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub keywords: Vec<String>,
    pub domain: String,
    pub node_types: Vec<String>,
    pub category: String,
    pub schema_fingerprint: String,
    pub flow_data: Value,
    pub success_count: i64,
    pub last_used_at: i64,
}

/// Input for saving a new pattern.
#[derive(Debug, Clone)]
pub struct NewPattern {
    pub keywords: Vec<String>,
    pub domain: String,
    pub node_types: Vec<String>,
    pub category: String,
    pub schema_fingerprint: String,
    pub flow_data: Value,
}

/// Durable pattern storage contract.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Keyword/domain/category-filtered search, ranked by keyword overlap
    /// then success count.
    async fn search_filtered(
        &self,
        keywords: &[String],
        domain: Option<&str>,
        category: Option<&str>,
        node_types: &[String],
        limit: u32,
    ) -> Result<Vec<Pattern>>;

    /// Fetch a pattern's graph payload for use as the compilation base.
    async fn apply_as_base_graph(&self, pattern_id: &str) -> Result<Option<Value>>;

    async fn save(&self, pattern: NewPattern) -> Result<Pattern>;

    /// Bump `success_count` and `last_used_at`.
    async fn record_success(&self, pattern_id: &str) -> Result<()>;

    async fn list(&self, limit: u32) -> Result<Vec<Pattern>>;
}

/// SQLite-backed pattern store.
#[derive(Clone)]
pub struct SqlitePatternStore {
    pool: SqlitePool,
}

impl SqlitePatternStore {
    /// Open (or create) the pattern database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| CodevError::PatternStore(format!("failed to open {}: {}", url, e)))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!(path = %path.display(), "Pattern store ready");
        Ok(store)
    }

    /// In-memory store for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CodevError::PatternStore(e.to_string()))?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS patterns (
                id TEXT PRIMARY KEY,
                keywords TEXT NOT NULL,
                domain TEXT NOT NULL,
                node_types TEXT NOT NULL,
                category TEXT NOT NULL,
                schema_fingerprint TEXT NOT NULL,
                flow_data TEXT NOT NULL,
                success_count INTEGER NOT NULL DEFAULT 0,
                last_used_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_pattern(row: sqlx::sqlite::SqliteRow) -> Result<Pattern> {
        let keywords: String = row.get("keywords");
        let node_types: String = row.get("node_types");
        let flow_data: String = row.get("flow_data");
        Ok(Pattern {
            id: row.get("id"),
            keywords: split_csv(&keywords),
            domain: row.get("domain"),
            node_types: split_csv(&node_types),
            category: row.get("category"),
            schema_fingerprint: row.get("schema_fingerprint"),
            flow_data: serde_json::from_str(&flow_data)?,
            success_count: row.get("success_count"),
            last_used_at: row.get("last_used_at"),
        })
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn join_csv(items: &[String]) -> String {
    items
        .iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

fn keyword_overlap(pattern_keywords: &[String], query: &[String]) -> usize {
    query
        .iter()
        .filter(|q| {
            let q = q.to_ascii_lowercase();
            pattern_keywords
                .iter()
                .any(|k| k.to_ascii_lowercase() == q)
        })
        .count()
}

#[async_trait]
impl PatternStore for SqlitePatternStore {
    async fn search_filtered(
        &self,
        keywords: &[String],
        domain: Option<&str>,
        category: Option<&str>,
        node_types: &[String],
        limit: u32,
    ) -> Result<Vec<Pattern>> {
        // SQL narrows by domain/category; keyword and node-type ranking
        // happens in process over the narrowed set.
        let rows = match (domain, category) {
            (Some(d), Some(c)) => {
                sqlx::query("SELECT * FROM patterns WHERE domain = ? AND category = ?")
                    .bind(d)
                    .bind(c)
                    .fetch_all(&self.pool)
                    .await?
            }
            (Some(d), None) => {
                sqlx::query("SELECT * FROM patterns WHERE domain = ?")
                    .bind(d)
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, Some(c)) => {
                sqlx::query("SELECT * FROM patterns WHERE category = ?")
                    .bind(c)
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, None) => sqlx::query("SELECT * FROM patterns").fetch_all(&self.pool).await?,
        };

        let mut scored: Vec<(usize, Pattern)> = Vec::new();
        for row in rows {
            let pattern = Self::row_to_pattern(row)?;
            let mut score = keyword_overlap(&pattern.keywords, keywords);
            if !node_types.is_empty() {
                score += node_types
                    .iter()
                    .filter(|t| pattern.node_types.contains(t))
                    .count();
            }
            if score > 0 || (keywords.is_empty() && node_types.is_empty()) {
                scored.push((score, pattern));
            }
        }
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(b.1.success_count.cmp(&a.1.success_count))
        });

        Ok(scored
            .into_iter()
            .take(limit as usize)
            .map(|(_, p)| p)
            .collect())
    }

    async fn apply_as_base_graph(&self, pattern_id: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT * FROM patterns WHERE id = ?")
            .bind(pattern_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(Self::row_to_pattern(row)?.flow_data)),
            None => Ok(None),
        }
    }

    async fn save(&self, pattern: NewPattern) -> Result<Pattern> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let flow_data = serde_json::to_string(&pattern.flow_data)?;

        sqlx::query(
            "INSERT INTO patterns (id, keywords, domain, node_types, category,
                                   schema_fingerprint, flow_data, success_count, last_used_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&id)
        .bind(join_csv(&pattern.keywords))
        .bind(&pattern.domain)
        .bind(join_csv(&pattern.node_types))
        .bind(&pattern.category)
        .bind(&pattern.schema_fingerprint)
        .bind(&flow_data)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(pattern_id = %id, "Saved pattern");
        Ok(Pattern {
            id,
            keywords: pattern.keywords,
            domain: pattern.domain,
            node_types: pattern.node_types,
            category: pattern.category,
            schema_fingerprint: pattern.schema_fingerprint,
            flow_data: pattern.flow_data,
            success_count: 1,
            last_used_at: now,
        })
    }

    async fn record_success(&self, pattern_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE patterns SET success_count = success_count + 1, last_used_at = ? WHERE id = ?",
        )
        .bind(Utc::now().timestamp())
        .bind(pattern_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, limit: u32) -> Result<Vec<Pattern>> {
        let rows = sqlx::query("SELECT * FROM patterns ORDER BY success_count DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_pattern).collect()
    }
}
