//! Flowise platform API client
//!
//! [`FlowisePlatform`] is the seam between the agent and the external
//! platform; tests substitute scripted implementations. The HTTP client
//! mirrors the platform's REST surface and never interprets payloads
//! beyond JSON decoding.

use crate::error::{CodevError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Platform operations the agent depends on.
#[async_trait]
pub trait FlowisePlatform: Send + Sync {
    /// All chatflows visible to the API key.
    async fn list_chatflows(&self) -> Result<Value>;

    /// One chatflow, including its `flowData`.
    async fn get_chatflow(&self, id: &str) -> Result<Value>;

    /// Create a chatflow; returns the created record with its id.
    async fn create_chatflow(&self, body: &Value) -> Result<Value>;

    /// Replace a chatflow's payload.
    async fn update_chatflow(&self, id: &str, body: &Value) -> Result<Value>;

    /// Run a prediction against a deployed chatflow.
    async fn run_prediction(&self, id: &str, body: &Value) -> Result<Value>;

    /// Full listing of node schemas.
    async fn list_node_schemas(&self) -> Result<Value>;

    /// One node schema by node type name (the repair path).
    async fn get_node_schema(&self, name: &str) -> Result<Value>;

    /// Redacted credential listing.
    async fn list_credentials(&self) -> Result<Value>;

    /// Marketplace template listing.
    async fn list_templates(&self) -> Result<Value>;
}

/// `reqwest`-backed implementation of [`FlowisePlatform`].
#[derive(Clone)]
pub struct HttpFlowiseClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HttpFlowiseClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client,
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| CodevError::Retriable(format!("GET {}: {}", path, e)))?;
        Self::decode(path, response).await
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CodevError::Retriable(format!("{}: {}", path, e)))?;
        Self::decode(path, response).await
    }

    async fn decode(path: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                CodevError::Retriable(format!("{} returned {}: {}", path, status, body))
            } else {
                CodevError::ToolExecution(format!("{} returned {}: {}", path, status, body))
            });
        }
        response
            .json()
            .await
            .map_err(|e| CodevError::ToolExecution(format!("{} returned non-JSON: {}", path, e)))
    }
}

#[async_trait]
impl FlowisePlatform for HttpFlowiseClient {
    async fn list_chatflows(&self) -> Result<Value> {
        self.get("/api/v1/chatflows").await
    }

    async fn get_chatflow(&self, id: &str) -> Result<Value> {
        self.get(&format!("/api/v1/chatflows/{}", id)).await
    }

    async fn create_chatflow(&self, body: &Value) -> Result<Value> {
        self.send_json(reqwest::Method::POST, "/api/v1/chatflows", body)
            .await
    }

    async fn update_chatflow(&self, id: &str, body: &Value) -> Result<Value> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/api/v1/chatflows/{}", id),
            body,
        )
        .await
    }

    async fn run_prediction(&self, id: &str, body: &Value) -> Result<Value> {
        self.send_json(
            reqwest::Method::POST,
            &format!("/api/v1/prediction/{}", id),
            body,
        )
        .await
    }

    async fn list_node_schemas(&self) -> Result<Value> {
        self.get("/api/v1/nodes").await
    }

    async fn get_node_schema(&self, name: &str) -> Result<Value> {
        self.get(&format!("/api/v1/nodes/{}", name)).await
    }

    async fn list_credentials(&self) -> Result<Value> {
        self.get("/api/v1/credentials").await
    }

    async fn list_templates(&self) -> Result<Value> {
        self.get("/api/v1/marketplaces/templates").await
    }
}
