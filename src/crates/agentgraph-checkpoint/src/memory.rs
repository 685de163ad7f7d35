//! In-memory checkpoint storage for development and testing
//!
//! Stores the complete checkpoint history per thread in a thread-safe map.
//! Ideal for tests and short-lived sessions; data does not survive process
//! restart. Production deployments implement [`CheckpointSaver`] over a
//! durable store instead.

use crate::checkpoint::Checkpoint;
use crate::error::Result;
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory [`CheckpointSaver`].
///
/// Each thread id maps to its checkpoint chain in insertion order; `load`
/// returns the most recent entry. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointSaver {
    threads: Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints stored for `thread_id`.
    pub async fn history_len(&self, thread_id: &str) -> usize {
        self.threads
            .read()
            .await
            .get(thread_id)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Drop all stored checkpoints. Test isolation helper.
    pub async fn clear(&self) {
        self.threads.write().await.clear();
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn save(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<()> {
        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).and_then(|v| v.last().cloned()))
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let threads = self.threads.read().await;
        let mut ids: Vec<String> = threads.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.threads.write().await.remove(thread_id);
        Ok(())
    }

    async fn load_history(&self, thread_id: &str, steps_back: usize) -> Result<Option<Checkpoint>> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).and_then(|chain| {
            if steps_back >= chain.len() {
                None
            } else {
                chain.get(chain.len() - 1 - steps_back).cloned()
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cp(step: u64) -> Checkpoint {
        let mut c = Checkpoint::initial(json!({"step": step}), "n");
        c.step = step;
        c
    }

    #[tokio::test]
    async fn save_and_load_returns_latest() {
        let saver = InMemoryCheckpointSaver::new();
        saver.save("t1", cp(0)).await.unwrap();
        saver.save("t1", cp(1)).await.unwrap();

        let latest = saver.load("t1").await.unwrap().unwrap();
        assert_eq!(latest.step, 1);
        assert_eq!(saver.history_len("t1").await, 2);
    }

    #[tokio::test]
    async fn load_unknown_thread_is_none() {
        let saver = InMemoryCheckpointSaver::new();
        assert!(saver.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_thread_removes_history() {
        let saver = InMemoryCheckpointSaver::new();
        saver.save("t1", cp(0)).await.unwrap();
        saver.delete_thread("t1").await.unwrap();

        assert!(saver.load("t1").await.unwrap().is_none());
        assert!(saver.list_threads().await.unwrap().is_empty());
        // deleting again is a no-op
        saver.delete_thread("t1").await.unwrap();
    }

    #[tokio::test]
    async fn threads_are_isolated() {
        let saver = InMemoryCheckpointSaver::new();
        saver.save("a", cp(0)).await.unwrap();
        saver.save("b", cp(5)).await.unwrap();

        assert_eq!(saver.load("a").await.unwrap().unwrap().step, 0);
        assert_eq!(saver.load("b").await.unwrap().unwrap().step, 5);
        assert_eq!(saver.list_threads().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn history_walks_backwards_from_latest() {
        let saver = InMemoryCheckpointSaver::new();
        for step in 0..4 {
            saver.save("t", cp(step)).await.unwrap();
        }

        assert_eq!(saver.load_history("t", 0).await.unwrap().unwrap().step, 3);
        assert_eq!(saver.load_history("t", 2).await.unwrap().unwrap().step, 1);
        assert!(saver.load_history("t", 4).await.unwrap().is_none());
    }
}
