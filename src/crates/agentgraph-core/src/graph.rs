//! Graph construction: nodes, edges, conditional routing
//!
//! A [`Graph`] is a set of named async nodes connected by either a direct
//! edge or a conditional router (a closure over the post-update state).
//! Routing to [`END`] terminates the session. The graph is inert until
//! handed to [`CompiledGraph`](crate::runner::CompiledGraph), which checks
//! structural validity once at build time.

use crate::error::{GraphError, Result};
use crate::interrupt::InterruptRequest;
use crate::retry::RetryPolicy;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Node identifier within a graph
pub type NodeId = String;

/// Terminal pseudo-node: routing here ends the session.
pub const END: &str = "__end__";

/// Per-invocation context handed to every node.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Session identity (checkpoint key)
    pub thread_id: String,
    /// Response injected by `resume`, present only on the first node after a
    /// suspension
    pub resume: Option<Value>,
}

/// What a node produced.
#[derive(Debug)]
pub enum NodeOutcome {
    /// Apply the update and follow this node's outgoing edge
    Advance(Value),
    /// Apply the update, persist the interrupt and hand control to the caller
    Interrupt {
        update: Value,
        request: InterruptRequest,
    },
    /// Apply the update and end the session regardless of edges
    Halt(Value),
}

impl NodeOutcome {
    pub fn advance(update: Value) -> Self {
        Self::Advance(update)
    }

    pub fn interrupt(update: Value, request: InterruptRequest) -> Self {
        Self::Interrupt { update, request }
    }

    pub fn halt(update: Value) -> Self {
        Self::Halt(update)
    }
}

/// Boxed node future
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<NodeOutcome>> + Send>>;

/// Node implementation: `(state, context) -> outcome`
pub type NodeFn = Arc<dyn Fn(Value, RunContext) -> NodeFuture + Send + Sync>;

/// Conditional router: inspects post-update state, names the next node.
pub type Router = Arc<dyn Fn(&Value) -> NodeId + Send + Sync>;

/// A registered node plus its execution policy.
#[derive(Clone)]
pub struct NodeSpec {
    pub run: NodeFn,
    /// Retry policy for retriable failures; `None` disables retries
    pub retry: Option<RetryPolicy>,
}

/// Outgoing edge of a node.
#[derive(Clone)]
pub enum Edge {
    /// Unconditional transition
    Direct(NodeId),
    /// State-dependent transition
    Conditional(Router),
}

/// A directed graph of async nodes over shared JSON state.
#[derive(Default)]
pub struct Graph {
    nodes: HashMap<NodeId, NodeSpec>,
    edges: HashMap<NodeId, Edge>,
    entry: Option<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under `id`.
    pub fn add_node<F>(&mut self, id: impl Into<String>, run: F)
    where
        F: Fn(Value, RunContext) -> NodeFuture + Send + Sync + 'static,
    {
        self.nodes.insert(
            id.into(),
            NodeSpec {
                run: Arc::new(run),
                retry: Some(RetryPolicy::default()),
            },
        );
    }

    /// Register a node with an explicit retry policy (or none).
    pub fn add_node_with_retry<F>(
        &mut self,
        id: impl Into<String>,
        run: F,
        retry: Option<RetryPolicy>,
    ) where
        F: Fn(Value, RunContext) -> NodeFuture + Send + Sync + 'static,
    {
        self.nodes.insert(
            id.into(),
            NodeSpec {
                run: Arc::new(run),
                retry,
            },
        );
    }

    /// Unconditional edge `from -> to`. `to` may be [`END`].
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.edges.insert(from.into(), Edge::Direct(to.into()));
    }

    /// Conditional edge: `router` picks the successor from the state.
    pub fn add_conditional_edge<F>(&mut self, from: impl Into<String>, router: F)
    where
        F: Fn(&Value) -> NodeId + Send + Sync + 'static,
    {
        self.edges
            .insert(from.into(), Edge::Conditional(Arc::new(router)));
    }

    /// Set the node the session starts at.
    pub fn set_entry(&mut self, node: impl Into<String>) {
        self.entry = Some(node.into());
    }

    pub fn entry(&self) -> Option<&NodeId> {
        self.entry.as_ref()
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Structural validation: entry exists, every direct edge targets a
    /// registered node or END, every node has an outgoing edge.
    ///
    /// Conditional routers are closures and can only be checked at runtime;
    /// an unknown router target surfaces as [`GraphError::UnknownNode`]
    /// during execution.
    pub fn validate(&self) -> Result<()> {
        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| GraphError::InvalidGraph("no entry point set".to_string()))?;
        if !self.nodes.contains_key(entry) {
            return Err(GraphError::InvalidGraph(format!(
                "entry point '{}' is not a registered node",
                entry
            )));
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::InvalidGraph(format!(
                    "edge from unknown node '{}'",
                    from
                )));
            }
            if let Edge::Direct(to) = edge {
                if to != END && !self.nodes.contains_key(to) {
                    return Err(GraphError::InvalidGraph(format!(
                        "edge '{}' -> '{}' targets unknown node",
                        from, to
                    )));
                }
            }
        }

        for id in self.nodes.keys() {
            if !self.edges.contains_key(id) {
                return Err(GraphError::InvalidGraph(format!(
                    "node '{}' has no outgoing edge",
                    id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(id: &str, graph: &mut Graph) {
        graph.add_node(id, |_state, _ctx| {
            Box::pin(async { Ok(NodeOutcome::advance(json!({}))) })
        });
    }

    #[test]
    fn validate_accepts_well_formed_graph() {
        let mut g = Graph::new();
        noop("a", &mut g);
        noop("b", &mut g);
        g.set_entry("a");
        g.add_edge("a", "b");
        g.add_edge("b", END);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_entry() {
        let mut g = Graph::new();
        noop("a", &mut g);
        g.add_edge("a", END);
        assert!(matches!(g.validate(), Err(GraphError::InvalidGraph(_))));
    }

    #[test]
    fn validate_rejects_dangling_edge_target() {
        let mut g = Graph::new();
        noop("a", &mut g);
        g.set_entry("a");
        g.add_edge("a", "ghost");
        assert!(matches!(g.validate(), Err(GraphError::InvalidGraph(_))));
    }

    #[test]
    fn validate_rejects_node_without_edge() {
        let mut g = Graph::new();
        noop("a", &mut g);
        noop("b", &mut g);
        g.set_entry("a");
        g.add_edge("a", "b");
        assert!(matches!(g.validate(), Err(GraphError::InvalidGraph(_))));
    }
}
