//! The [`CheckpointSaver`] storage abstraction
//!
//! Graph execution calls `save` after every node transition and `load` on
//! every resume, so backends should be optimized for single-row upsert and
//! latest-by-thread retrieval. Implementations must be `Send + Sync`;
//! concurrent sessions write under distinct thread ids and never contend on
//! the same key.

use crate::checkpoint::Checkpoint;
use crate::error::Result;
use async_trait::async_trait;

/// Storage backend contract for checkpoint persistence.
///
/// The stored value is owned by the state machine; backends treat it as an
/// opaque blob keyed by `thread_id`. `save` replaces the latest checkpoint
/// for the thread (backends may additionally retain history for rollback).
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Persist `checkpoint` as the latest snapshot for `thread_id`.
    async fn save(&self, thread_id: &str, checkpoint: Checkpoint) -> Result<()>;

    /// Fetch the latest checkpoint for `thread_id`, or `None` if the thread
    /// is unknown (including after `delete_thread`).
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// All thread ids with at least one stored checkpoint.
    async fn list_threads(&self) -> Result<Vec<String>>;

    /// Remove every checkpoint for `thread_id`. Deleting an unknown thread
    /// is not an error. In-flight writes to a deleted thread are discarded
    /// by the backend.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Fetch a historical checkpoint `steps_back` saves before the latest.
    ///
    /// Backends without history support may return `None`; the in-memory
    /// backend retains the full chain.
    async fn load_history(&self, thread_id: &str, steps_back: usize) -> Result<Option<Checkpoint>> {
        let _ = (thread_id, steps_back);
        Ok(None)
    }
}
