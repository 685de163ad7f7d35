//! Process bootstrap: logging and runtime assembly

use crate::capability::FlowiseCapability;
use crate::config::{AgentConfig, ReasoningEngine};
use crate::error::Result;
use crate::events::{EventSink, InMemoryEventSink};
use crate::knowledge::anchor_store::AnchorDictionaryStore;
use crate::knowledge::credential_store::CredentialStore;
use crate::knowledge::pattern_store::SqlitePatternStore;
use crate::knowledge::schema_store::NodeSchemaStore;
use crate::knowledge::template_store::TemplateStore;
use crate::nodes::AgentContext;
use crate::session::SessionManager;
use crate::tools::{register_flowise_tools, DiscoverCache, HttpFlowiseClient, ToolRegistry};
use agentgraph_checkpoint::InMemoryCheckpointSaver;
use agentgraph_core::ChatModel;
use llm::{ClaudeClient, OpenAiClient, RemoteLlmConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialise tracing once; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Build the reasoning model selected by the configuration.
pub fn build_reasoning_model(config: &AgentConfig) -> Result<Arc<dyn ChatModel>> {
    let (env_var, base_url) = match config.reasoning_engine {
        ReasoningEngine::Claude => ("ANTHROPIC_API_KEY", "https://api.anthropic.com"),
        ReasoningEngine::OpenAi => ("OPENAI_API_KEY", "https://api.openai.com/v1"),
    };
    let llm_config = RemoteLlmConfig::from_env(env_var, base_url, config.reasoning_model.clone())
        .map_err(|e| crate::error::CodevError::Config(e.to_string()))?
        .with_temperature(config.reasoning_temperature);

    Ok(match config.reasoning_engine {
        ReasoningEngine::Claude => Arc::new(ClaudeClient::new(llm_config)),
        ReasoningEngine::OpenAi => Arc::new(OpenAiClient::new(llm_config)),
    })
}

/// Assemble a full runtime from configuration: knowledge stores from the
/// local snapshots, platform client, tool registry, capabilities, and the
/// session manager over an in-memory checkpointer (durable checkpointing
/// is a deployment concern wired in by the embedding service).
pub async fn build_runtime(config: AgentConfig) -> Result<SessionManager> {
    let model = build_reasoning_model(&config)?;

    let schema_store = Arc::new(NodeSchemaStore::load_from_file(&config.schema_snapshot_path)?);
    let anchor_store = Arc::new(AnchorDictionaryStore::new(Arc::clone(&schema_store)));
    let credential_store = Arc::new(CredentialStore::load_from_file(
        &config.credential_snapshot_path,
    )?);
    let template_store = Arc::new(TemplateStore::new());
    let pattern_store = Arc::new(SqlitePatternStore::open(&config.pattern_db_path).await?);

    let platform = Arc::new(HttpFlowiseClient::new(
        config.flowise_endpoint.clone(),
        config.flowise_api_key.clone(),
        config.tool_timeout,
    ));
    let mut registry = ToolRegistry::new();
    register_flowise_tools(&mut registry, platform);
    let registry = Arc::new(registry);
    let cache = Arc::new(DiscoverCache::new(config.discover_cache_ttl));

    let capability = Arc::new(FlowiseCapability {
        registry: Arc::clone(&registry),
        cache: Arc::clone(&cache),
        model: Arc::clone(&model),
        schema_store: Arc::clone(&schema_store),
        anchor_store: Arc::clone(&anchor_store),
        credential_store: Arc::clone(&credential_store),
        template_store: Arc::clone(&template_store),
        pattern_store: pattern_store.clone(),
        tool_timeout: config.tool_timeout,
    });

    let events: Arc<dyn EventSink> = Arc::new(InMemoryEventSink::new());

    let ctx = Arc::new(AgentContext {
        config,
        model,
        registry,
        cache,
        schema_store,
        anchor_store,
        credential_store,
        template_store,
        pattern_store,
        capabilities: vec![capability],
        events,
    });

    SessionManager::new(ctx, Arc::new(InMemoryCheckpointSaver::new()))
}
