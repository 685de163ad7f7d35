//! LLM provider implementations for the codev agent.
//!
//! This crate provides concrete implementations of the `ChatModel` trait
//! from `agentgraph-core` for the reasoning engines the agent selects
//! between at startup:
//!
//! - **Claude** - Anthropic's Messages API
//! - **OpenAI** - Chat Completions API
//!
//! Providers translate their error taxonomy into the engine's: HTTP
//! failures, 429s and 5xx responses become retriable errors so the graph
//! runner's backoff applies; auth and request errors are permanent.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::{config::RemoteLlmConfig, remote::ClaudeClient};
//! use agentgraph_core::{ChatModel, ChatRequest, Message};
//!
//! let config = RemoteLlmConfig::from_env(
//!     "FLOWISE_AGENT_ANTHROPIC_KEY",
//!     "https://api.anthropic.com",
//!     "claude-sonnet-4-20250514",
//! )?;
//! let client = ClaudeClient::new(config);
//! let response = client.chat(ChatRequest::new(vec![Message::human("hi")])).await?;
//! ```

pub mod config;
pub mod error;
pub mod remote;

pub use config::RemoteLlmConfig;
pub use error::{LlmError, Result};
pub use remote::{ClaudeClient, OpenAiClient};
