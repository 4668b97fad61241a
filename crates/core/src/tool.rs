//! Tool abstractions.
//!
//! A `ToolBackend` is whatever chat sessions can discover and invoke tools
//! through: the local `ToolRegistry` of in-process `Tool`s, or a remote MCP
//! server. Calls return text, either whole or as a stream of fragments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::error::ToolError;

/// The result of a local tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into() }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self { success: false, output: output.into() }
    }
}

/// Receiving half of a streamed tool call.
pub type ToolStream = mpsc::Receiver<Result<String, ToolError>>;

/// An in-process tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search_feeds").
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, ToolError>;
}

/// Discovery and invocation of tools by name.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Names of the tools currently available.
    async fn list_tools(&self) -> Result<Vec<String>, ToolError>;

    /// Invoke a tool and wait for its whole output.
    async fn call(&self, tool: &str, params: serde_json::Value) -> Result<String, ToolError>;

    /// Invoke a tool and receive its output as fragments.
    ///
    /// Default implementation calls `call()` and yields one fragment.
    async fn call_streaming(&self, tool: &str, params: serde_json::Value) -> Result<ToolStream, ToolError> {
        let output = self.call(tool, params).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(Ok(output)).await;
        Ok(rx)
    }
}

/// A registry of in-process tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, params: serde_json::Value) -> Result<ToolResult, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(params).await
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolBackend for ToolRegistry {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_tools(&self) -> Result<Vec<String>, ToolError> {
        Ok(self.names().into_iter().map(String::from).collect())
    }

    async fn call(&self, tool: &str, params: serde_json::Value) -> Result<String, ToolError> {
        let result = self.execute(tool, params).await?;
        if result.success {
            Ok(result.output)
        } else {
            Err(ToolError::ExecutionFailed {
                tool_name: tool.to_string(),
                reason: result.output,
            })
        }
    }
}
