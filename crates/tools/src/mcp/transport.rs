//! Transport for MCP messages.

use async_trait::async_trait;
use feedloom_core::error::ToolError;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::protocol::{RpcNotification, RpcRequest, RpcResponse, response_from_sse};

const SESSION_HEADER: &str = "mcp-session-id";

#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn send(&self, request: RpcRequest) -> Result<RpcResponse, ToolError>;

    async fn notify(&self, notification: RpcNotification) -> Result<(), ToolError>;
}

/// Streamable-HTTP transport: every message is one POST; the reply is
/// either a JSON body or an SSE body carrying the response.
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
            session_id: RwLock::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, body: &impl serde::Serialize) -> Result<reqwest::Response, ToolError> {
        let mut builder = self
            .client
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .json(body);
        if let Some(id) = self.session_id.read().await.as_deref() {
            builder = builder.header(SESSION_HEADER, id);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Transport(format!("request to {} timed out", self.url))
            } else {
                ToolError::Transport(e.to_string())
            }
        })?;

        if let Some(id) = response.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            *self.session_id.write().await = Some(id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Transport(format!("HTTP {}: {body}", status.as_u16())));
        }
        Ok(response)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn send(&self, request: RpcRequest) -> Result<RpcResponse, ToolError> {
        debug!(url = %self.url, method = %request.method, id = request.id, "MCP request");
        let id = request.id;
        let response = self.post(&request).await?;

        let is_sse = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.text().await.map_err(|e| ToolError::Transport(e.to_string()))?;

        if is_sse {
            response_from_sse(&body, id).ok_or_else(|| ToolError::Protocol {
                code: -32700,
                message: format!("no response with id {id} in event stream"),
            })
        } else {
            serde_json::from_str(&body).map_err(|e| ToolError::Protocol {
                code: -32700,
                message: format!("invalid JSON-RPC response: {e}"),
            })
        }
    }

    async fn notify(&self, notification: RpcNotification) -> Result<(), ToolError> {
        self.post(&notification).await.map(|_| ())
    }
}
