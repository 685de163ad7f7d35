//! Shared test harness: scripted reasoning model, mock platform, and a
//! fully wired session manager over in-memory backends.

#![allow(dead_code)]

use agentgraph_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
use agentgraph_core::error::Result as GraphResult;
use agentgraph_core::llm::{ChatModel, ChatRequest, ChatResponse, UsageMetadata};
use agentgraph_core::{Message, MessageRole};
use async_trait::async_trait;
use codev::capability::FlowiseCapability;
use codev::config::AgentConfig;
use codev::error::{CodevError, Result};
use codev::events::{EventSink, InMemoryEventSink};
use codev::knowledge::anchor_store::AnchorDictionaryStore;
use codev::knowledge::credential_store::CredentialStore;
use codev::knowledge::pattern_store::SqlitePatternStore;
use codev::knowledge::schema_store::{NodeSchema, NodeSchemaStore};
use codev::knowledge::template_store::TemplateStore;
use codev::nodes::AgentContext;
use codev::session::SessionManager;
use codev::state::SessionState;
use codev::tools::{register_flowise_tools, DiscoverCache, FlowisePlatform, ToolRegistry};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Schemas used across the integration suites.
pub fn sample_schemas() -> Vec<NodeSchema> {
    serde_json::from_value(json!([
        {
            "name": "chatOpenAI",
            "label": "ChatOpenAI",
            "version": 2,
            "category": "Chat Models",
            "baseClasses": ["ChatOpenAI", "BaseChatModel"],
            "inputAnchors": [
                {"name": "memory", "label": "Memory", "type": "BaseMemory", "optional": true,
                 "id": "{nodeId}-input-memory-BaseMemory"}
            ],
            "inputParams": [
                {"name": "modelName", "label": "Model Name", "type": "string",
                 "default": "gpt-4o", "id": "{nodeId}-input-modelName-string"},
                {"name": "credential", "label": "Connect Credential", "type": "credential",
                 "optional": true, "id": "{nodeId}-input-credential-credential"}
            ],
            "outputAnchors": [
                {"name": "chatOpenAI", "label": "ChatOpenAI",
                 "type": "ChatOpenAI | BaseChatModel",
                 "id": "{nodeId}-output-chatOpenAI-ChatOpenAI|BaseChatModel"}
            ]
        },
        {
            "name": "bufferMemory",
            "label": "Buffer Memory",
            "version": 1,
            "category": "Memory",
            "baseClasses": ["BufferMemory", "BaseMemory"],
            "inputAnchors": [],
            "inputParams": [
                {"name": "sessionId", "label": "Session Id", "type": "string", "optional": true}
            ],
            "outputAnchors": [
                {"name": "bufferMemory", "label": "BufferMemory",
                 "type": "BufferMemory | BaseMemory",
                 "id": "{nodeId}-output-bufferMemory-BufferMemory|BaseMemory"}
            ]
        },
        {
            "name": "conversationChain",
            "label": "Conversation Chain",
            "version": 1,
            "category": "Chains",
            "baseClasses": ["ConversationChain", "BaseChain"],
            "inputAnchors": [
                {"name": "model", "label": "Chat Model", "type": "BaseChatModel",
                 "id": "{nodeId}-input-model-BaseChatModel"},
                {"name": "memory", "label": "Memory", "type": "BaseMemory", "optional": true,
                 "id": "{nodeId}-input-memory-BaseMemory"}
            ],
            "inputParams": [],
            "outputAnchors": [
                {"name": "conversationChain", "label": "ConversationChain",
                 "type": "ConversationChain | BaseChain",
                 "id": "{nodeId}-output-conversationChain-ConversationChain|BaseChain"}
            ]
        }
    ]))
    .expect("fixture schemas parse")
}

/// A platform chatflow record as stored by the mock.
pub fn chatflow_record(id: &str, name: &str, deployed: bool, flow_data: &Value) -> Value {
    json!({
        "id": id,
        "name": name,
        "deployed": deployed,
        "flowData": serde_json::to_string(flow_data).unwrap(),
    })
}

/// Scripted chat model: responses are keyed by which agent prompt is
/// calling, and pop in order (the last response for a key repeats).
pub struct ScriptedModel {
    scripts: Mutex<HashMap<&'static str, VecDeque<String>>>,
    pub requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        let model = Self {
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        };

        // defaults drive a clean CREATE session end to end
        model.script("classify", "INTENT: CREATE\nTARGET: none");
        model.script("clarify", "SCORE: 1\nQUESTIONS:\n");
        model.script("summarize", "A single chatOpenAI node answers questions directly.");
        model.script(
            "discover",
            "The platform offers chat model, memory and chain nodes.\nCREDENTIALS_STATUS: OK\nMISSING_TYPES:",
        );
        model.script(
            "plan",
            "Build a minimal echo chat graph.\n\nGOAL: Echo chat graph\nACTION: CREATE\nDOMAIN_TARGETS: flowise\nCREDENTIAL_REQUIREMENTS: none\nDATA_FIELDS: message\nPII_FIELDS: none\nSUCCESS_CRITERIA:\n- response length > 0\n",
        );
        model.script(
            "ops",
            r#"[{"op":"add_node","node_id":"chatOpenAI_0","node_type":"chatOpenAI","params":{}}]"#,
        );
        model.script("verdict", "VERDICT: DONE\nCRITERIA:\n- [pass] response length > 0\n");

        Arc::new(model)
    }

    fn key_for(system: &str) -> &'static str {
        if system.starts_with("Classify") {
            "classify"
        } else if system.starts_with("Assess how ambiguous") {
            "clarify"
        } else if system.starts_with("Summarize an existing") {
            "summarize"
        } else if system.starts_with("You distill platform") {
            "discover"
        } else if system.starts_with("You plan changes") {
            "plan"
        } else if system.starts_with("You translate an approved plan") {
            "ops"
        } else if system.starts_with("You judge whether") {
            "verdict"
        } else {
            "unknown"
        }
    }

    /// Queue a response for a prompt key.
    pub fn script(&self, key: &'static str, response: &str) {
        self.scripts
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(response.to_string());
    }

    /// Drop all queued responses for a key.
    pub fn clear(&self, key: &'static str) {
        self.scripts.lock().unwrap().remove(key);
    }

    /// All recorded `(system, user)` request pairs for a key.
    pub fn requests_for(&self, key: &'static str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(system, _)| Self::key_for(system) == key)
            .map(|(_, user)| user.clone())
            .collect()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, request: ChatRequest) -> GraphResult<ChatResponse> {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.text().to_string())
            .unwrap_or_default();
        let user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Human)
            .map(|m| m.text().to_string())
            .unwrap_or_default();

        let key = Self::key_for(&system);
        self.requests.lock().unwrap().push((system, user));

        let text = {
            let mut scripts = self.scripts.lock().unwrap();
            let queue = scripts.entry(key).or_default();
            match queue.len() {
                0 => format!("no scripted response for '{}'", key),
                1 => queue.front().cloned().unwrap(),
                _ => queue.pop_front().unwrap(),
            }
        };

        Ok(ChatResponse {
            message: Message::assistant(text),
            usage: Some(UsageMetadata::new(100, 20)),
            metadata: HashMap::new(),
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// In-memory platform double with call counters.
pub struct MockPlatform {
    pub chatflows: Mutex<Vec<Value>>,
    pub schemas: Value,
    pub credentials: Value,
    pub templates: Value,
    pub prediction_text: Mutex<String>,
    pub create_count: AtomicU32,
    pub update_count: AtomicU32,
    pub prediction_count: AtomicU32,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            chatflows: Mutex::new(Vec::new()),
            schemas: serde_json::to_value(sample_schemas()).unwrap(),
            credentials: json!([
                {"id": "cred-A", "name": "OpenAI", "credentialName": "openAIApi"}
            ]),
            templates: json!([]),
            prediction_text: Mutex::new("Hello! How can I help?".to_string()),
            create_count: AtomicU32::new(0),
            update_count: AtomicU32::new(0),
            prediction_count: AtomicU32::new(0),
        })
    }

    pub fn seed_chatflow(&self, record: Value) {
        self.chatflows.lock().unwrap().push(record);
    }

    pub fn stored_flow_data(&self, id: &str) -> Option<Value> {
        self.chatflows
            .lock()
            .unwrap()
            .iter()
            .find(|c| c["id"] == id)
            .and_then(|c| c["flowData"].as_str().map(str::to_string))
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }
}

#[async_trait]
impl FlowisePlatform for MockPlatform {
    async fn list_chatflows(&self) -> Result<Value> {
        let listing: Vec<Value> = self
            .chatflows
            .lock()
            .unwrap()
            .iter()
            .map(|c| json!({"id": c["id"], "name": c["name"], "deployed": c["deployed"]}))
            .collect();
        Ok(Value::Array(listing))
    }

    async fn get_chatflow(&self, id: &str) -> Result<Value> {
        self.chatflows
            .lock()
            .unwrap()
            .iter()
            .find(|c| c["id"] == id)
            .cloned()
            .ok_or_else(|| CodevError::ToolExecution(format!("no chatflow '{}'", id)))
    }

    async fn create_chatflow(&self, body: &Value) -> Result<Value> {
        let n = self.create_count.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("graph-{}", n);
        let record = json!({
            "id": id,
            "name": body["name"],
            "deployed": body["deployed"].as_bool().unwrap_or(true),
            "flowData": body["flowData"],
        });
        self.chatflows.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update_chatflow(&self, id: &str, body: &Value) -> Result<Value> {
        self.update_count.fetch_add(1, Ordering::SeqCst);
        let mut chatflows = self.chatflows.lock().unwrap();
        let record = chatflows
            .iter_mut()
            .find(|c| c["id"] == id)
            .ok_or_else(|| CodevError::ToolExecution(format!("no chatflow '{}'", id)))?;
        if let Some(flow) = body.get("flowData") {
            record["flowData"] = flow.clone();
        }
        if let Some(deployed) = body.get("deployed") {
            record["deployed"] = deployed.clone();
        }
        Ok(record.clone())
    }

    async fn run_prediction(&self, _id: &str, _body: &Value) -> Result<Value> {
        self.prediction_count.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"text": self.prediction_text.lock().unwrap().clone()}))
    }

    async fn list_node_schemas(&self) -> Result<Value> {
        Ok(self.schemas.clone())
    }

    async fn get_node_schema(&self, name: &str) -> Result<Value> {
        self.schemas
            .as_array()
            .and_then(|schemas| schemas.iter().find(|s| s["name"] == name))
            .cloned()
            .ok_or_else(|| CodevError::ToolExecution(format!("no schema '{}'", name)))
    }

    async fn list_credentials(&self) -> Result<Value> {
        Ok(self.credentials.clone())
    }

    async fn list_templates(&self) -> Result<Value> {
        Ok(self.templates.clone())
    }
}

/// A fully wired manager over in-memory backends.
pub struct Harness {
    pub manager: SessionManager,
    pub saver: Arc<InMemoryCheckpointSaver>,
    pub platform: Arc<MockPlatform>,
    pub model: Arc<ScriptedModel>,
    pub patterns: Arc<SqlitePatternStore>,
    pub schema_store: Arc<NodeSchemaStore>,
    pub events: Arc<InMemoryEventSink>,
    pub ctx: Arc<AgentContext>,
}

impl Harness {
    pub async fn new(config: AgentConfig) -> Self {
        Self::with_platform(config, MockPlatform::new()).await
    }

    pub async fn with_platform(config: AgentConfig, platform: Arc<MockPlatform>) -> Self {
        let model = ScriptedModel::new();
        let schema_store = Arc::new(NodeSchemaStore::from_schemas(sample_schemas()));
        let anchor_store = Arc::new(AnchorDictionaryStore::new(Arc::clone(&schema_store)));
        let credential_store = Arc::new(CredentialStore::new());
        let template_store = Arc::new(TemplateStore::new());
        let patterns = Arc::new(SqlitePatternStore::in_memory().await.unwrap());

        let mut registry = ToolRegistry::new();
        register_flowise_tools(&mut registry, platform.clone() as Arc<dyn FlowisePlatform>);
        let registry = Arc::new(registry);
        let cache = Arc::new(DiscoverCache::new(config.discover_cache_ttl));

        let capability = Arc::new(FlowiseCapability {
            registry: Arc::clone(&registry),
            cache: Arc::clone(&cache),
            model: model.clone() as Arc<dyn ChatModel>,
            schema_store: Arc::clone(&schema_store),
            anchor_store: Arc::clone(&anchor_store),
            credential_store: Arc::clone(&credential_store),
            template_store: Arc::clone(&template_store),
            pattern_store: patterns.clone(),
            tool_timeout: config.tool_timeout,
        });

        let events = Arc::new(InMemoryEventSink::new());

        let ctx = Arc::new(AgentContext {
            config,
            model: model.clone() as Arc<dyn ChatModel>,
            registry,
            cache,
            schema_store: Arc::clone(&schema_store),
            anchor_store,
            credential_store,
            template_store,
            pattern_store: patterns.clone(),
            capabilities: vec![capability],
            events: events.clone() as Arc<dyn EventSink>,
        });

        let saver = Arc::new(InMemoryCheckpointSaver::new());
        let manager = SessionManager::new(Arc::clone(&ctx), saver.clone()).unwrap();

        Self {
            manager,
            saver,
            platform,
            model,
            patterns,
            schema_store,
            events,
            ctx,
        }
    }

    /// Latest checkpointed session state.
    pub async fn state(&self, thread_id: &str) -> SessionState {
        let checkpoint = self
            .saver
            .load(thread_id)
            .await
            .unwrap()
            .expect("thread has a checkpoint");
        SessionState::from_value(&checkpoint.state).unwrap()
    }
}
