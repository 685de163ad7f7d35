//! Tool execution layer
//!
//! Platform operations are exposed as namespaced async tools returning a
//! uniform result envelope. Only the envelope's `summary` (capped at 300
//! chars) ever reaches LLM prompts; full payloads are routed into the
//! session's `debug` channel.

pub mod cache;
pub mod flowise;
pub mod registry;

pub use cache::DiscoverCache;
pub use flowise::{FlowisePlatform, HttpFlowiseClient};
pub use registry::{execute_tool, register_flowise_tools, Tool, ToolRegistry, ToolResult};
