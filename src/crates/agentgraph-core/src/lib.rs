//! agentgraph-core - checkpointed state-machine engine for agent workflows
//!
//! The engine executes a directed graph of async nodes over a JSON state
//! object. Exactly one node runs at a time per session; after every node the
//! state update is folded in through a reducer schema and the result is
//! checkpointed, so a session can be suspended (for human input) and resumed
//! in a different process.
//!
//! # Building blocks
//!
//! - [`state::StateSchema`] - per-field reducers (overwrite, append, merge,
//!   sum) applied to node updates
//! - [`graph::Graph`] - nodes plus direct and conditional edges
//! - [`interrupt::InterruptRequest`] - typed human-in-the-loop suspensions
//! - [`retry::RetryPolicy`] - exponential backoff for retriable node errors
//! - [`runner::CompiledGraph`] - the execution loop: run, apply, checkpoint,
//!   route or suspend
//! - [`llm::ChatModel`] - provider-agnostic chat abstraction used by nodes
//!
//! # Example
//!
//! ```rust,ignore
//! use agentgraph_core::{Graph, StateSchema, CompiledGraph, NodeOutcome};
//! use agentgraph_checkpoint::InMemoryCheckpointSaver;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut graph = Graph::new();
//! graph.add_node("greet", |state, _ctx| {
//!     Box::pin(async move { Ok(NodeOutcome::advance(json!({"greeting": "hello"}))) })
//! });
//! graph.set_entry("greet");
//! graph.add_edge("greet", agentgraph_core::END);
//!
//! let compiled = CompiledGraph::new(
//!     graph,
//!     StateSchema::new(),
//!     Arc::new(InMemoryCheckpointSaver::new()),
//! )?;
//! let outcome = compiled.start("thread-1", json!({})).await?;
//! ```

pub mod error;
pub mod graph;
pub mod interrupt;
pub mod llm;
pub mod message;
pub mod retry;
pub mod runner;
pub mod state;

pub use error::{GraphError, Result};
pub use graph::{Edge, Graph, NodeId, NodeOutcome, NodeSpec, RunContext, END};
pub use interrupt::InterruptRequest;
pub use llm::{ChatConfig, ChatModel, ChatRequest, ChatResponse, UsageMetadata};
pub use message::{Message, MessageRole};
pub use retry::RetryPolicy;
pub use runner::{CompiledGraph, RunOutcome};
pub use state::{AppendReducer, MergeReducer, OverwriteReducer, Reducer, StateSchema, SumReducer};

pub use agentgraph_checkpoint::{Checkpoint, CheckpointSaver, PendingInterrupt};
