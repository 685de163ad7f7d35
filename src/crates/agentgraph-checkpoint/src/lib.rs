//! Checkpoint persistence for agentgraph state machines
//!
//! A checkpoint is a full snapshot of a session's durable state taken after
//! every node execution, plus the bookkeeping needed to resume: the next node
//! to run and any pending human-in-the-loop interrupt. Storage backends
//! implement the [`CheckpointSaver`] trait; the in-memory backend in
//! [`memory`] is the reference implementation used by tests and development.
//!
//! External durable backends (e.g. Postgres) live in downstream crates and
//! only need to satisfy the four-method contract:
//! `save / load / list_threads / delete_thread`.

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod traits;

pub use checkpoint::{Checkpoint, CheckpointMetadata, PendingInterrupt};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use traits::CheckpointSaver;
