//! Provider-agnostic chat model abstraction
//!
//! Nodes that reason with an LLM depend on [`ChatModel`], never on a
//! concrete provider. Provider implementations (Claude, OpenAI) live in the
//! `llm` crate; tests substitute scripted models. Responses carry
//! [`UsageMetadata`] so callers can account tokens against session budgets.

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Sampling configuration for a single request.
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop_sequences: Vec<String>,
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub config: ChatConfig,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            config: ChatConfig::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageMetadata {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,
    pub usage: Option<UsageMetadata>,
    /// Provider-specific extras (model name, stop reason)
    pub metadata: HashMap<String, Value>,
}

impl ChatResponse {
    pub fn text(&self) -> &str {
        self.message.text()
    }
}

/// Provider-agnostic chat interface.
///
/// Implementations map provider failures onto
/// [`GraphError::Retriable`](crate::error::GraphError::Retriable) for
/// transient conditions (rate limits, timeouts) and
/// [`GraphError::Llm`](crate::error::GraphError::Llm) otherwise, so the
/// runner's backoff applies uniformly.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Identifier of the underlying model, for logs and metrics.
    fn model_name(&self) -> &str;
}
