//! Session manager: the programmatic surface the HTTP layer calls
//!
//! Owns the compiled orchestration graph and translates engine outcomes
//! into session responses. Creation is rate-limited per caller; resume and
//! status calls are not. Interrupt suspensions fan out to the session's
//! webhook (fire and forget) and everything is recorded in the event log,
//! which deletion cascades over.

use crate::error::{CodevError, Result};
use crate::events::{event, EventKind, EventSink};
use crate::models::{
    InterruptType, InterruptView, SessionResponse, SessionStatus, SessionSummary,
};
use crate::nodes::{build_agent_graph, AgentContext};
use crate::rate_limit::RateLimiter;
use crate::state::{channel_schema, SessionState};
use crate::webhook::WebhookNotifier;
use agentgraph_checkpoint::{Checkpoint, CheckpointSaver, PendingInterrupt};
use agentgraph_core::{CompiledGraph, GraphError, RunOutcome};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Input to session creation.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionRequest {
    pub requirement: String,
    pub webhook_url: Option<String>,
    /// Explicit thread id; generated when absent
    pub thread_id: Option<String>,
    /// Rate-limit key; anonymous callers share one bucket
    pub caller: Option<String>,
}

pub struct SessionManager {
    compiled: CompiledGraph,
    ctx: Arc<AgentContext>,
    checkpointer: Arc<dyn CheckpointSaver>,
    events: Arc<dyn EventSink>,
    webhooks: WebhookNotifier,
    rate_limiter: RateLimiter,
}

impl SessionManager {
    pub fn new(ctx: Arc<AgentContext>, checkpointer: Arc<dyn CheckpointSaver>) -> Result<Self> {
        let graph = build_agent_graph(&ctx);
        let compiled = CompiledGraph::new(graph, channel_schema(), Arc::clone(&checkpointer))
            .map_err(|e| CodevError::Internal(format!("graph assembly failed: {}", e)))?;

        let rate_limiter = RateLimiter::new(
            ctx.config.rate_limit_sessions_per_min as usize,
            std::time::Duration::from_secs(60),
        );
        let events = Arc::clone(&ctx.events);

        Ok(Self {
            compiled,
            ctx,
            checkpointer,
            events,
            webhooks: WebhookNotifier::new(),
            rate_limiter,
        })
    }

    /// Create a session and drive it to its first suspension or end.
    pub async fn create(&self, request: CreateSessionRequest) -> Result<SessionResponse> {
        let thread_id = request
            .thread_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let caller = request.caller.as_deref().unwrap_or("anonymous");
        if !self.rate_limiter.check(caller).await {
            warn!(caller = %caller, "Session creation rate-limited");
            return Ok(error_response(
                &thread_id,
                "RATE_LIMIT",
                format!(
                    "caller exceeded {} sessions/min",
                    self.ctx.config.rate_limit_sessions_per_min
                ),
                self.ctx.config.runtime_mode.as_str(),
            ));
        }

        info!(thread_id = %thread_id, "Creating session");
        self.events
            .record(event(
                &thread_id,
                EventKind::SessionCreated,
                serde_json::json!({"requirement": request.requirement}),
            ))
            .await;

        let initial = SessionState::initial(
            thread_id.clone(),
            request.requirement,
            self.ctx.config.runtime_mode.as_str(),
            request.webhook_url,
        );

        let outcome = self.compiled.start(&thread_id, initial).await;
        self.outcome_to_response(&thread_id, outcome).await
    }

    /// Resume a suspended session with a human response.
    pub async fn resume(&self, thread_id: &str, response: Value) -> Result<SessionResponse> {
        info!(thread_id = %thread_id, "Resuming session");
        self.events
            .record(event(thread_id, EventKind::Resumed, serde_json::json!({})))
            .await;

        let outcome = self.compiled.resume(thread_id, response).await;
        self.outcome_to_response(thread_id, outcome).await
    }

    /// Current status without advancing execution.
    pub async fn get(&self, thread_id: &str) -> Result<Option<SessionResponse>> {
        let Some(checkpoint) = self.checkpointer.load(thread_id).await? else {
            return Ok(None);
        };
        Ok(Some(checkpoint_response(thread_id, &checkpoint)))
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        Ok(self.checkpointer.list_threads().await?)
    }

    /// Delete the session; cascades to checkpoints and events. Pending
    /// interrupts die with the thread.
    pub async fn delete(&self, thread_id: &str) -> Result<()> {
        self.checkpointer.delete_thread(thread_id).await?;
        self.events.delete_thread(thread_id).await;
        info!(thread_id = %thread_id, "Session deleted");
        Ok(())
    }

    /// Compact digest for the summary endpoint.
    pub async fn summary(&self, thread_id: &str) -> Result<Option<SessionSummary>> {
        let Some(checkpoint) = self.checkpointer.load(thread_id).await? else {
            return Ok(None);
        };
        let state = SessionState::from_value(&checkpoint.state)?;
        let status = status_of(&checkpoint, &state);

        Ok(Some(SessionSummary {
            thread_id: thread_id.to_string(),
            status,
            requirement: state.requirement,
            intent: state.intent.map(|i| {
                match i {
                    crate::state::Intent::Create => "CREATE",
                    crate::state::Intent::Update => "UPDATE",
                }
                .to_string()
            }),
            target_graph_id: state.target_graph_id,
            iteration: state.iteration,
            verdict_status: state.verdict.map(|v| {
                if v.is_done() { "DONE" } else { "ITERATE" }.to_string()
            }),
            total_input_tokens: state.total_input_tokens,
            total_output_tokens: state.total_output_tokens,
            phase_count: state.phase_metrics.len(),
        }))
    }

    /// Restore the checkpoint `steps_back` saves before the latest and make
    /// it the session's current state.
    pub async fn rollback(&self, thread_id: &str, steps_back: usize) -> Result<Option<SessionResponse>> {
        let Some(historical) = self
            .checkpointer
            .load_history(thread_id, steps_back)
            .await?
        else {
            return Ok(None);
        };
        self.checkpointer
            .save(thread_id, historical.clone())
            .await?;
        info!(thread_id = %thread_id, steps_back, "Session rolled back");
        Ok(Some(checkpoint_response(thread_id, &historical)))
    }

    async fn outcome_to_response(
        &self,
        thread_id: &str,
        outcome: std::result::Result<RunOutcome, GraphError>,
    ) -> Result<SessionResponse> {
        match outcome {
            Ok(RunOutcome::Suspended {
                state, interrupt, ..
            }) => {
                let state = SessionState::from_value(&state)?;
                self.events
                    .record(event(
                        thread_id,
                        EventKind::Interrupted,
                        serde_json::json!({"type": interrupt.kind, "node": interrupt.node}),
                    ))
                    .await;

                if let Some(url) = &state.webhook_url {
                    self.webhooks.notify(
                        url.clone(),
                        serde_json::json!({
                            "thread_id": thread_id,
                            "interrupt": interrupt.payload,
                        }),
                    );
                }

                Ok(suspended_response(thread_id, &state, &interrupt))
            }
            Ok(RunOutcome::Complete { state, .. }) => {
                let state = SessionState::from_value(&state)?;
                let response = completed_response(thread_id, &state);
                let kind = match response.status {
                    SessionStatus::Error => EventKind::Failed,
                    _ => EventKind::Completed,
                };
                self.events
                    .record(event(
                        thread_id,
                        kind,
                        serde_json::json!({"error": state.error}),
                    ))
                    .await;
                Ok(response)
            }
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "Session failed in the scheduler");
                self.events
                    .record(event(
                        thread_id,
                        EventKind::Failed,
                        serde_json::json!({"error": e.to_string()}),
                    ))
                    .await;
                Ok(error_response(
                    thread_id,
                    "INTERNAL",
                    e.to_string(),
                    self.ctx.config.runtime_mode.as_str(),
                ))
            }
        }
    }
}

fn status_of(checkpoint: &Checkpoint, state: &SessionState) -> SessionStatus {
    if state.error.is_some() {
        SessionStatus::Error
    } else if checkpoint.is_suspended() {
        SessionStatus::PendingInterrupt
    } else {
        SessionStatus::Completed
    }
}

fn base_response(thread_id: &str, state: &SessionState, status: SessionStatus) -> SessionResponse {
    SessionResponse {
        thread_id: thread_id.to_string(),
        status,
        iteration: state.iteration,
        interrupt: None,
        total_input_tokens: state.total_input_tokens,
        total_output_tokens: state.total_output_tokens,
        runtime_mode: state.runtime_mode.clone(),
        error_kind: None,
        error_detail: None,
    }
}

fn suspended_response(
    thread_id: &str,
    state: &SessionState,
    interrupt: &PendingInterrupt,
) -> SessionResponse {
    let mut response = base_response(thread_id, state, SessionStatus::PendingInterrupt);
    response.interrupt = InterruptType::parse(&interrupt.kind).map(|t| InterruptView {
        interrupt_type: t,
        payload: interrupt.payload.clone(),
    });
    response
}

fn completed_response(thread_id: &str, state: &SessionState) -> SessionResponse {
    match &state.error {
        Some(record) => {
            let mut response = base_response(thread_id, state, SessionStatus::Error);
            response.error_kind = Some(record.kind.clone());
            response.error_detail = Some(record.detail.clone());
            response
        }
        None => base_response(thread_id, state, SessionStatus::Completed),
    }
}

fn checkpoint_response(thread_id: &str, checkpoint: &Checkpoint) -> SessionResponse {
    let state = SessionState::from_value(&checkpoint.state).unwrap_or_default();
    match &checkpoint.pending_interrupt {
        Some(interrupt) => suspended_response(thread_id, &state, interrupt),
        None => completed_response(thread_id, &state),
    }
}

fn error_response(
    thread_id: &str,
    kind: &str,
    detail: String,
    runtime_mode: &str,
) -> SessionResponse {
    SessionResponse {
        thread_id: thread_id.to_string(),
        status: SessionStatus::Error,
        iteration: 0,
        interrupt: None,
        total_input_tokens: 0,
        total_output_tokens: 0,
        runtime_mode: runtime_mode.to_string(),
        error_kind: Some(kind.to_string()),
        error_detail: Some(detail),
    }
}
