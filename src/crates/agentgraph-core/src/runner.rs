//! Graph execution: run, apply, checkpoint, route or suspend
//!
//! [`CompiledGraph`] drives one session at a time through the node graph.
//! The loop is strictly sequential per thread:
//!
//! 1. run the current node (with retry on retriable failures)
//! 2. fold its update into the state through the [`StateSchema`]
//! 3. persist a checkpoint
//! 4. follow the node's edge, or suspend on an interrupt, or end
//!
//! Because the checkpoint written at each step carries the next node and any
//! pending interrupt, a session can be resumed from cold storage in another
//! process: `resume` loads the checkpoint, injects the human response into
//! the state field named by the interrupt and continues at the recorded
//! node. Concurrent sessions are independent; nothing is shared beyond the
//! checkpointer handle.

use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph, NodeOutcome, RunContext, END};
use crate::state::StateSchema;
use agentgraph_checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSaver, PendingInterrupt};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of driving a session until it ends or suspends.
#[derive(Debug)]
pub enum RunOutcome {
    /// The session reached END
    Complete { state: Value, step: u64 },
    /// The session is suspended on a human-in-the-loop interrupt
    Suspended {
        state: Value,
        interrupt: PendingInterrupt,
        step: u64,
    },
}

impl RunOutcome {
    pub fn state(&self) -> &Value {
        match self {
            Self::Complete { state, .. } => state,
            Self::Suspended { state, .. } => state,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// A validated graph bound to a state schema and a checkpoint backend.
pub struct CompiledGraph {
    graph: Graph,
    schema: StateSchema,
    checkpointer: Arc<dyn CheckpointSaver>,
    step_limit: u64,
}

impl CompiledGraph {
    /// Validate `graph` and bind it to its schema and checkpointer.
    pub fn new(
        graph: Graph,
        schema: StateSchema,
        checkpointer: Arc<dyn CheckpointSaver>,
    ) -> Result<Self> {
        graph.validate()?;
        Ok(Self {
            graph,
            schema,
            checkpointer,
            step_limit: 256,
        })
    }

    /// Cap on node executions per thread, a backstop against routing cycles.
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn checkpointer(&self) -> Arc<dyn CheckpointSaver> {
        Arc::clone(&self.checkpointer)
    }

    /// Start a new session under `thread_id` with the given initial state.
    pub async fn start(&self, thread_id: &str, input: Value) -> Result<RunOutcome> {
        let entry = self
            .graph
            .entry()
            .cloned()
            .ok_or_else(|| GraphError::InvalidGraph("no entry point set".to_string()))?;

        let checkpoint = Checkpoint::initial(input, entry.clone());
        self.checkpointer.save(thread_id, checkpoint.clone()).await?;

        self.run_loop(thread_id, checkpoint.state, entry, checkpoint.step, None)
            .await
    }

    /// Resume a suspended session by injecting `response` into the state
    /// field named by the pending interrupt.
    pub async fn resume(&self, thread_id: &str, response: Value) -> Result<RunOutcome> {
        let checkpoint = self
            .checkpointer
            .load(thread_id)
            .await?
            .ok_or_else(|| GraphError::NoCheckpoint(thread_id.to_string()))?;

        let pending = checkpoint
            .pending_interrupt
            .clone()
            .ok_or_else(|| GraphError::NotSuspended(thread_id.to_string()))?;

        let mut state = checkpoint.state;
        let mut injection = serde_json::Map::new();
        injection.insert(pending.resume_key.clone(), response.clone());
        self.schema.apply(&mut state, &Value::Object(injection))?;

        let resumed = Checkpoint {
            state: state.clone(),
            next_node: Some(pending.resume_to.clone()),
            pending_interrupt: None,
            step: checkpoint.step,
            metadata: CheckpointMetadata::new("resume").with_node(&pending.node),
            created_at: Utc::now(),
        };
        self.checkpointer.save(thread_id, resumed).await?;

        self.run_loop(
            thread_id,
            state,
            pending.resume_to,
            checkpoint.step,
            Some(response),
        )
        .await
    }

    /// Latest persisted state for `thread_id`, if any.
    pub async fn state(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.checkpointer.load(thread_id).await?)
    }

    async fn run_loop(
        &self,
        thread_id: &str,
        mut state: Value,
        mut current: String,
        mut step: u64,
        mut resume: Option<Value>,
    ) -> Result<RunOutcome> {
        loop {
            if step >= self.step_limit {
                return Err(GraphError::StepLimit {
                    thread_id: thread_id.to_string(),
                    limit: self.step_limit,
                });
            }

            let spec = self
                .graph
                .node(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?;

            debug!(thread_id = %thread_id, node = %current, step, "Running node");

            let ctx = RunContext {
                thread_id: thread_id.to_string(),
                resume: resume.take(),
            };
            let outcome = self.run_with_retry(&current, spec, state.clone(), ctx).await?;
            step += 1;

            match outcome {
                NodeOutcome::Advance(update) => {
                    self.schema.apply(&mut state, &update)?;
                    let next = self.route(&current, &state)?;

                    let done = next.as_deref() == Some(END) || next.is_none();
                    let checkpoint = Checkpoint {
                        state: state.clone(),
                        next_node: if done { None } else { next.clone() },
                        pending_interrupt: None,
                        step,
                        metadata: CheckpointMetadata::new("loop").with_node(&current),
                        created_at: Utc::now(),
                    };
                    self.checkpointer.save(thread_id, checkpoint).await?;

                    if done {
                        return Ok(RunOutcome::Complete { state, step });
                    }
                    current = next.expect("checked above");
                }
                NodeOutcome::Interrupt { update, request } => {
                    self.schema.apply(&mut state, &update)?;
                    if !self.graph.has_node(&request.resume_to) {
                        return Err(GraphError::UnknownNode(request.resume_to));
                    }
                    let pending = request.into_pending(current.clone());

                    let checkpoint = Checkpoint {
                        state: state.clone(),
                        next_node: Some(pending.resume_to.clone()),
                        pending_interrupt: Some(pending.clone()),
                        step,
                        metadata: CheckpointMetadata::new("loop").with_node(&current),
                        created_at: Utc::now(),
                    };
                    self.checkpointer.save(thread_id, checkpoint).await?;

                    debug!(
                        thread_id = %thread_id,
                        node = %pending.node,
                        kind = %pending.kind,
                        "Session suspended"
                    );
                    return Ok(RunOutcome::Suspended {
                        state,
                        interrupt: pending,
                        step,
                    });
                }
                NodeOutcome::Halt(update) => {
                    self.schema.apply(&mut state, &update)?;
                    let checkpoint = Checkpoint {
                        state: state.clone(),
                        next_node: None,
                        pending_interrupt: None,
                        step,
                        metadata: CheckpointMetadata::new("loop").with_node(&current),
                        created_at: Utc::now(),
                    };
                    self.checkpointer.save(thread_id, checkpoint).await?;
                    return Ok(RunOutcome::Complete { state, step });
                }
            }
        }
    }

    async fn run_with_retry(
        &self,
        node: &str,
        spec: &crate::graph::NodeSpec,
        state: Value,
        ctx: RunContext,
    ) -> Result<NodeOutcome> {
        let mut attempts: u32 = 0;
        loop {
            match (spec.run)(state.clone(), ctx.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retriable() => {
                    attempts += 1;
                    let policy = match &spec.retry {
                        Some(p) if p.should_retry(attempts) => p,
                        _ => {
                            warn!(node = %node, attempts, "Retries exhausted");
                            return Err(GraphError::node_execution(
                                node,
                                format!("retries exhausted: {}", err),
                            ));
                        }
                    };
                    let delay = policy.calculate_delay(attempts - 1);
                    warn!(node = %node, attempts, ?delay, "Retriable failure, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn route(&self, from: &str, state: &Value) -> Result<Option<String>> {
        match self.graph.edge(from) {
            Some(Edge::Direct(to)) => Ok(Some(to.clone())),
            Some(Edge::Conditional(router)) => {
                let to = router(state);
                if to != END && !self.graph.has_node(&to) {
                    return Err(GraphError::UnknownNode(to));
                }
                Ok(Some(to))
            }
            None => Ok(None),
        }
    }
}
