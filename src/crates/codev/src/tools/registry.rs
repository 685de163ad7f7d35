//! Namespaced tool registry and the uniform execution envelope
//!
//! Tools are registered under dotted names (`flowise.list_graphs`) and
//! invoked exclusively through [`execute_tool`], which enforces the
//! per-call timeout and the compact-result discipline: `summary` is capped
//! at 300 characters and is the only part of a result that may be injected
//! into LLM context; `data` is full fidelity and goes to `debug` storage.

use crate::error::Result;
use crate::tools::cache::DiscoverCache;
use crate::tools::flowise::FlowisePlatform;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const SUMMARY_LIMIT: usize = 300;

/// Uniform tool result envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub ok: bool,
    /// Compact description, <= 300 chars; the only prompt-visible part
    pub summary: String,
    /// Full payload, stored in the session's debug channel
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(summary: impl Into<String>, data: Value) -> Self {
        Self {
            ok: true,
            summary: truncate_summary(summary.into()),
            data,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            ok: false,
            summary: truncate_summary(format!("error: {}", error)),
            data: Value::Null,
            error: Some(error),
        }
    }
}

fn truncate_summary(mut summary: String) -> String {
    if summary.chars().count() > SUMMARY_LIMIT {
        summary = summary.chars().take(SUMMARY_LIMIT - 3).collect::<String>() + "...";
    }
    summary
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolResult>> + Send>>;
type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A registered tool.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// Stable reads eligible for the discover cache
    pub cacheable: bool,
    handler: ToolHandler,
}

/// Dotted-namespace tool registry.
pub struct ToolRegistry {
    id: String,
    tools: HashMap<String, Tool>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tools: HashMap::new(),
        }
    }

    /// Identity used to scope cache entries to this registry instance.
    pub fn registry_id(&self) -> &str {
        &self.id
    }

    pub fn register<F>(&mut self, name: &str, description: &str, cacheable: bool, handler: F)
    where
        F: Fn(Value) -> ToolFuture + Send + Sync + 'static,
    {
        self.tools.insert(
            name.to_string(),
            Tool {
                name: name.to_string(),
                description: description.to_string(),
                cacheable,
                handler: Arc::new(handler),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Execute a tool with timeout and optional caching.
///
/// Never returns `Err` for tool-level failures: every failure mode is
/// encoded in the envelope so callers can store it and reason about it
/// uniformly. The returned flag reports whether the result was served from
/// cache.
pub async fn execute_tool(
    name: &str,
    args: Value,
    registry: &ToolRegistry,
    cache: Option<&DiscoverCache>,
    timeout: Duration,
) -> (ToolResult, bool) {
    let Some(tool) = registry.get(name) else {
        return (
            ToolResult::failure(format!("unknown tool '{}'", name)),
            false,
        );
    };

    if tool.cacheable {
        if let Some(cache) = cache {
            if let Some(hit) = cache.get(registry.registry_id(), name, &args) {
                debug!(tool = %name, "Tool cache hit");
                return (hit, true);
            }
        }
    }

    let result = match tokio::time::timeout(timeout, (tool.handler)(args.clone())).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            warn!(tool = %name, error = %err, "Tool failed");
            ToolResult::failure(err.to_string())
        }
        Err(_) => {
            warn!(tool = %name, ?timeout, "Tool timed out");
            ToolResult::failure(format!("timed out after {:?}", timeout))
        }
    };

    if result.ok && tool.cacheable {
        if let Some(cache) = cache {
            cache.put(registry.registry_id(), name, &args, result.clone());
        }
    }

    (result, false)
}

/// Register the platform operations under the `flowise.` namespace.
pub fn register_flowise_tools(registry: &mut ToolRegistry, platform: Arc<dyn FlowisePlatform>) {
    let p = Arc::clone(&platform);
    registry.register(
        "flowise.list_graphs",
        "List all chatflows on the platform",
        false,
        move |_args| {
            let p = Arc::clone(&p);
            Box::pin(async move {
                let data = p.list_chatflows().await?;
                let count = data.as_array().map(Vec::len).unwrap_or(0);
                Ok(ToolResult::success(format!("{} graphs", count), data))
            })
        },
    );

    let p = Arc::clone(&platform);
    registry.register(
        "flowise.get_graph",
        "Fetch one chatflow including its flow data",
        false,
        move |args| {
            let p = Arc::clone(&p);
            Box::pin(async move {
                let id = args["id"].as_str().unwrap_or_default().to_string();
                let data = p.get_chatflow(&id).await?;
                let name = data["name"].as_str().unwrap_or("unnamed");
                Ok(ToolResult::success(
                    format!("graph '{}' ({})", name, id),
                    data,
                ))
            })
        },
    );

    let p = Arc::clone(&platform);
    registry.register(
        "flowise.create_graph",
        "Create a chatflow from a compiled payload",
        false,
        move |args| {
            let p = Arc::clone(&p);
            Box::pin(async move {
                let data = p.create_chatflow(&args).await?;
                let id = data["id"].as_str().unwrap_or("unknown");
                Ok(ToolResult::success(format!("created graph {}", id), data))
            })
        },
    );

    let p = Arc::clone(&platform);
    registry.register(
        "flowise.update_graph",
        "Replace a chatflow's payload",
        false,
        move |args| {
            let p = Arc::clone(&p);
            Box::pin(async move {
                let id = args["id"].as_str().unwrap_or_default().to_string();
                let data = p.update_chatflow(&id, &args["body"]).await?;
                Ok(ToolResult::success(format!("updated graph {}", id), data))
            })
        },
    );

    let p = Arc::clone(&platform);
    registry.register(
        "flowise.run_prediction",
        "Run a prediction against a deployed chatflow",
        false,
        move |args| {
            let p = Arc::clone(&p);
            Box::pin(async move {
                let id = args["id"].as_str().unwrap_or_default().to_string();
                let data = p.run_prediction(&id, &args["body"]).await?;
                let text = data["text"].as_str().unwrap_or_default();
                Ok(ToolResult::success(
                    format!("prediction: {}", text),
                    data,
                ))
            })
        },
    );

    let p = Arc::clone(&platform);
    registry.register(
        "flowise.list_nodes",
        "List all node schemas",
        true,
        move |_args| {
            let p = Arc::clone(&p);
            Box::pin(async move {
                let data = p.list_node_schemas().await?;
                let count = data.as_array().map(Vec::len).unwrap_or(0);
                Ok(ToolResult::success(format!("{} node types", count), data))
            })
        },
    );

    let p = Arc::clone(&platform);
    registry.register(
        "flowise.get_node_schema",
        "Fetch a single node schema by name",
        false,
        move |args| {
            let p = Arc::clone(&p);
            Box::pin(async move {
                let name = args["name"].as_str().unwrap_or_default().to_string();
                let data = p.get_node_schema(&name).await?;
                Ok(ToolResult::success(format!("schema for {}", name), data))
            })
        },
    );

    let p = Arc::clone(&platform);
    registry.register(
        "flowise.list_credentials",
        "List credentials (redacted)",
        false,
        move |_args| {
            let p = Arc::clone(&p);
            Box::pin(async move {
                let data = p.list_credentials().await?;
                let types: Vec<&str> = data
                    .as_array()
                    .map(|creds| {
                        creds
                            .iter()
                            .filter_map(|c| c["credentialName"].as_str())
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(ToolResult::success(
                    format!("{} credentials ({})", types.len(), types.join(", ")),
                    data,
                ))
            })
        },
    );

    let p = Arc::clone(&platform);
    registry.register(
        "flowise.list_templates",
        "List marketplace templates",
        true,
        move |_args| {
            let p = Arc::clone(&p);
            Box::pin(async move {
                let data = p.list_templates().await?;
                let count = data.as_array().map(Vec::len).unwrap_or(0);
                Ok(ToolResult::success(format!("{} templates", count), data))
            })
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodevError;
    use serde_json::json;

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register("test.echo", "echo args", true, |args| {
            Box::pin(async move { Ok(ToolResult::success("echoed", args)) })
        });
        registry.register("test.fail", "always fails", false, |_| {
            Box::pin(async move {
                Err::<ToolResult, _>(CodevError::ToolExecution("boom".to_string()))
            })
        });
        registry.register("test.slow", "sleeps", false, |_| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ToolResult::success("done", Value::Null))
            })
        });
        registry
    }

    #[tokio::test]
    async fn unknown_tool_is_failure_envelope() {
        let registry = echo_registry();
        let (result, cached) = execute_tool(
            "test.ghost",
            json!({}),
            &registry,
            None,
            Duration::from_secs(1),
        )
        .await;
        assert!(!result.ok);
        assert!(!cached);
        assert!(result.error.unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn tool_error_becomes_envelope() {
        let registry = echo_registry();
        let (result, _) = execute_tool(
            "test.fail",
            json!({}),
            &registry,
            None,
            Duration::from_secs(1),
        )
        .await;
        assert!(!result.ok);
        assert!(result.summary.starts_with("error:"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_failure() {
        let registry = echo_registry();
        let (result, _) = execute_tool(
            "test.slow",
            json!({}),
            &registry,
            None,
            Duration::from_millis(50),
        )
        .await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn cacheable_tool_served_from_cache() {
        let registry = echo_registry();
        let cache = DiscoverCache::new(Duration::from_secs(300));

        let (first, cached_first) = execute_tool(
            "test.echo",
            json!({"q": 1}),
            &registry,
            Some(&cache),
            Duration::from_secs(1),
        )
        .await;
        assert!(first.ok);
        assert!(!cached_first);

        let (second, cached_second) = execute_tool(
            "test.echo",
            json!({"q": 1}),
            &registry,
            Some(&cache),
            Duration::from_secs(1),
        )
        .await;
        assert!(cached_second);
        assert_eq!(first, second);
    }

    #[test]
    fn summary_is_capped() {
        let long = "x".repeat(500);
        let result = ToolResult::success(long, Value::Null);
        assert!(result.summary.chars().count() <= 300);
        assert!(result.summary.ends_with("..."));
    }
}
