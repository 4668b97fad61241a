//! MCP client: tool discovery and invocation on a remote server.

pub mod protocol;
pub mod transport;

use async_trait::async_trait;
use feedloom_core::error::ToolError;
use feedloom_core::tool::{ToolBackend, ToolStream};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use protocol::{CallResult, INTERNAL_ERROR, METHOD_NOT_FOUND, RpcNotification, RpcRequest, ToolList};
pub use transport::{HttpTransport, McpTransport};

const PROTOCOL_VERSION: &str = "2025-03-26";

pub struct McpHttpClient {
    transport: Box<dyn McpTransport>,
    next_id: AtomicI64,
    initialized: Mutex<bool>,
}

impl McpHttpClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_transport(Box::new(HttpTransport::new(url, timeout)))
    }

    pub fn with_transport(transport: Box<dyn McpTransport>) -> Self {
        Self {
            transport,
            next_id: AtomicI64::new(1),
            initialized: Mutex::new(false),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn request(&self, method: &str, params: Option<serde_json::Value>) -> Result<serde_json::Value, ToolError> {
        self.transport
            .send(RpcRequest::new(self.next_id(), method, params))
            .await?
            .into_result()
    }

    /// Handshake once per client. Servers that do not implement
    /// `initialize` are used without it.
    async fn ensure_initialized(&self) -> Result<(), ToolError> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }

        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": { "name": "feedloom", "version": env!("CARGO_PKG_VERSION") },
            "capabilities": {},
        });
        match self.request("initialize", Some(params)).await {
            Ok(result) => {
                let server = result
                    .pointer("/serverInfo/name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                info!(server, "MCP session initialized");
                self.transport
                    .notify(RpcNotification::new("notifications/initialized"))
                    .await?;
            }
            Err(ToolError::Protocol { code: METHOD_NOT_FOUND, .. }) => {
                debug!("MCP server has no initialize method");
            }
            Err(e) => return Err(e),
        }

        *initialized = true;
        Ok(())
    }

    async fn call_result(&self, tool: &str, params: serde_json::Value) -> Result<CallResult, ToolError> {
        self.ensure_initialized().await?;
        let raw = self
            .request("tools/call", Some(serde_json::json!({ "name": tool, "arguments": params })))
            .await?;
        let result: CallResult = serde_json::from_value(raw).map_err(|e| ToolError::Protocol {
            code: INTERNAL_ERROR,
            message: format!("malformed tools/call result: {e}"),
        })?;

        if result.is_error {
            warn!(tool, "MCP tool reported an error");
            return Err(ToolError::ExecutionFailed {
                tool_name: tool.to_string(),
                reason: result.joined_text(),
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl ToolBackend for McpHttpClient {
    fn name(&self) -> &str {
        "mcp"
    }

    async fn list_tools(&self) -> Result<Vec<String>, ToolError> {
        self.ensure_initialized().await?;
        let raw = self.request("tools/list", None).await?;
        let list: ToolList = serde_json::from_value(raw).map_err(|e| ToolError::Protocol {
            code: INTERNAL_ERROR,
            message: format!("malformed tools/list result: {e}"),
        })?;
        Ok(list.tools.into_iter().map(|t| t.name).collect())
    }

    async fn call(&self, tool: &str, params: serde_json::Value) -> Result<String, ToolError> {
        Ok(self.call_result(tool, params).await?.joined_text())
    }

    async fn call_streaming(&self, tool: &str, params: serde_json::Value) -> Result<ToolStream, ToolError> {
        let result = self.call_result(tool, params).await?;
        let texts: Vec<String> = result.texts().into_iter().map(String::from).collect();

        let (tx, rx) = mpsc::channel(texts.len().max(1));
        for text in texts {
            let _ = tx.send(Ok(text)).await;
        }
        Ok(rx)
    }
}
