//! Discover-phase TTL cache
//!
//! Stable platform reads (node listings, templates) repeat across
//! discover runs; this cache serves them for a configurable TTL, keyed by
//! `(registry id, tool name, canonical args)`. A zero TTL disables the
//! cache entirely so every call hits the executor.

use crate::canonical;
use crate::tools::registry::ToolResult;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct DiscoverCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, ToolResult)>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DiscoverCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    fn key(registry_id: &str, name: &str, args: &Value) -> String {
        format!("{}:{}:{}", registry_id, name, canonical::to_canonical_json(args))
    }

    pub fn get(&self, registry_id: &str, name: &str, args: &Value) -> Option<ToolResult> {
        if !self.enabled() {
            return None;
        }
        let key = Self::key(registry_id, name, args);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some((stored_at, result)) if stored_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result.clone())
            }
            Some(_) => {
                entries.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, registry_id: &str, name: &str, args: &Value, result: ToolResult) {
        if !self.enabled() {
            return;
        }
        let key = Self::key(registry_id, name, args);
        self.entries.lock().insert(key, (Instant::now(), result));
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok_result() -> ToolResult {
        ToolResult::success("3 graphs", json!([1, 2, 3]))
    }

    #[test]
    fn hit_within_ttl() {
        let cache = DiscoverCache::new(Duration::from_secs(300));
        assert!(cache.get("r1", "flowise.list_graphs", &json!({})).is_none());
        cache.put("r1", "flowise.list_graphs", &json!({}), ok_result());

        let hit = cache.get("r1", "flowise.list_graphs", &json!({})).unwrap();
        assert!(hit.ok);
        assert_eq!(cache.hit_count(), 1);
        assert_eq!(cache.miss_count(), 1);
    }

    #[test]
    fn zero_ttl_disables_cache() {
        let cache = DiscoverCache::new(Duration::ZERO);
        assert!(!cache.enabled());
        cache.put("r1", "t", &json!({}), ok_result());
        assert!(cache.get("r1", "t", &json!({})).is_none());
        // disabled cache records neither hits nor misses
        assert_eq!(cache.hit_count(), 0);
        assert_eq!(cache.miss_count(), 0);
    }

    #[test]
    fn distinct_args_are_distinct_keys() {
        let cache = DiscoverCache::new(Duration::from_secs(300));
        cache.put("r1", "t", &json!({"id": "a"}), ok_result());
        assert!(cache.get("r1", "t", &json!({"id": "b"})).is_none());
        assert!(cache.get("r1", "t", &json!({"id": "a"})).is_some());
    }

    #[test]
    fn registry_identity_scopes_entries() {
        let cache = DiscoverCache::new(Duration::from_secs(300));
        cache.put("r1", "t", &json!({}), ok_result());
        assert!(cache.get("r2", "t", &json!({})).is_none());
    }
}
