//! codev - a co-development agent for Flowise dataflow graphs
//!
//! Given a natural-language requirement, the agent drives a durable,
//! resumable, human-in-the-loop state machine through
//! Clarify -> Discover -> Plan -> Compile-IR -> Validate -> Apply -> Test
//! -> Evaluate, constructing or updating a typed-node graph on the
//! platform and iterating until the evaluator is satisfied or a human
//! rejects the result.
//!
//! # Architecture
//!
//! - [`nodes`] - the orchestration state machine over `agentgraph-core`
//! - [`compiler`] - the deterministic patch compiler: IR ops in, sealed
//!   graph payload out, with hash-bound write-guard integrity
//! - [`ir`] / [`graphir`] - the op language and the indexed graph form,
//!   with pre- and post-compile validators
//! - [`knowledge`] - schema snapshot, derived anchor dictionary,
//!   credentials, templates, and the self-improving pattern library
//! - [`tools`] - namespaced platform tools behind a compact result
//!   envelope with a discover-phase TTL cache
//! - [`capability`] - the pluggable per-domain discover/compile interface
//! - [`session`] - the session surface: create, resume, status, delete,
//!   summary, rollback
//!
//! The graph never executes in this process; execution happens on the
//! platform, and this crate's tests exercise the machinery against
//! scripted platform and model doubles.

pub mod canonical;
pub mod capability;
pub mod compiler;
pub mod config;
pub mod contracts;
pub mod error;
pub mod events;
pub mod graphir;
pub mod init;
pub mod ir;
pub mod knowledge;
pub mod models;
pub mod nodes;
pub mod playbook;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod tools;
pub mod webhook;

pub use config::AgentConfig;
pub use error::{CodevError, Result};
pub use models::{SessionResponse, SessionStatus};
pub use session::{CreateSessionRequest, SessionManager};
