//! Session event log
//!
//! Lifecycle events recorded at two granularities: session operations
//! (creation, interruption, resumption, completion, failure, deletion)
//! and node execution (started/finished around every node run, with the
//! node name and disposition in the detail payload). The sink is an
//! external collaborator behind a trait; the in-memory implementation
//! backs tests and development. Deleting a thread cascades to its events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Kinds of session and node lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionCreated,
    /// A graph node began executing; `detail.node` names it
    NodeStarted,
    /// A graph node finished; `detail.disposition` records how
    /// (advance, interrupt, halt, error, retriable_error)
    NodeFinished,
    Interrupted,
    Resumed,
    Completed,
    Failed,
    Deleted,
}

/// One recorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub thread_id: String,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
    /// Small structured context (interrupt type, error kind, ...)
    pub detail: Value,
}

/// Event storage contract.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: SessionEvent);

    async fn events_for(&self, thread_id: &str) -> Vec<SessionEvent>;

    /// Remove all events for a thread (cascade from session deletion).
    async fn delete_thread(&self, thread_id: &str);
}

/// In-memory reference sink.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: RwLock<HashMap<String, Vec<SessionEvent>>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn record(&self, event: SessionEvent) {
        self.events
            .write()
            .await
            .entry(event.thread_id.clone())
            .or_default()
            .push(event);
    }

    async fn events_for(&self, thread_id: &str) -> Vec<SessionEvent> {
        self.events
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn delete_thread(&self, thread_id: &str) {
        self.events.write().await.remove(thread_id);
    }
}

/// Convenience constructor.
pub fn event(thread_id: &str, kind: EventKind, detail: Value) -> SessionEvent {
    SessionEvent {
        thread_id: thread_id.to_string(),
        kind,
        at: Utc::now(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn record_and_cascade_delete() {
        let sink = InMemoryEventSink::new();
        sink.record(event("t1", EventKind::SessionCreated, json!({})))
            .await;
        sink.record(event(
            "t1",
            EventKind::Interrupted,
            json!({"type": "plan_approval"}),
        ))
        .await;

        let events = sink.events_for("t1").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, EventKind::Interrupted);

        sink.delete_thread("t1").await;
        assert!(sink.events_for("t1").await.is_empty());
    }

    #[tokio::test]
    async fn node_lifecycle_events_carry_node_detail() {
        let sink = InMemoryEventSink::new();
        sink.record(event("t1", EventKind::NodeStarted, json!({"node": "clarify"})))
            .await;
        sink.record(event(
            "t1",
            EventKind::NodeFinished,
            json!({"node": "clarify", "disposition": "interrupt"}),
        ))
        .await;

        let events = sink.events_for("t1").await;
        assert_eq!(events[0].kind, EventKind::NodeStarted);
        assert_eq!(events[0].detail["node"], "clarify");
        assert_eq!(events[1].detail["disposition"], "interrupt");

        // snake_case on the wire
        let encoded = serde_json::to_value(&events[1]).unwrap();
        assert_eq!(encoded["kind"], "node_finished");
    }
}
