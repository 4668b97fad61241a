//! JSON-RPC 2.0 envelopes and the MCP tool payloads carried in them.

use feedloom_core::error::ToolError;
use serde::{Deserialize, Serialize};

const VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: VERSION.into(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A request without an id; the server sends nothing back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
}

impl RpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: VERSION.into(),
            method: method.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: i64, result: serde_json::Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: i64, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// The result value, or the server's error as a `ToolError`.
    pub fn into_result(self) -> Result<serde_json::Value, ToolError> {
        match (self.error, self.result) {
            (Some(e), _) => Err(ToolError::Protocol {
                code: e.code,
                message: e.message,
            }),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(serde_json::Value::Null),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolList {
    #[serde(default)]
    pub tools: Vec<ToolDef>,
}

/// One content item of a `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallResult {
    /// Text items in order; non-text items are dropped.
    pub fn texts(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|c| match c {
                Content::Text { text } => Some(text.as_str()),
                Content::Other => None,
            })
            .collect()
    }

    pub fn joined_text(&self) -> String {
        self.texts().join("\n")
    }
}

/// Find the response with `id` in a `text/event-stream` body.
///
/// Servers may interleave notifications before the response.
pub fn response_from_sse(body: &str, id: i64) -> Option<RpcResponse> {
    body.lines()
        .filter_map(|line| line.trim_end_matches('\r').strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<RpcResponse>(data.trim()).ok())
        .find(|resp| resp.id == Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_missing_params() {
        let json = serde_json::to_value(RpcRequest::new(3, "tools/list", None)).unwrap();
        assert_eq!(json, json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}));
    }

    #[test]
    fn error_response_becomes_protocol_error() {
        let err = RpcResponse::err(1, METHOD_NOT_FOUND, "no such method").into_result().unwrap_err();
        assert!(matches!(err, ToolError::Protocol { code: -32601, .. }));
    }

    #[test]
    fn call_result_keeps_text_items_only() {
        let result: CallResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                {"type": "text", "text": "second"}
            ],
            "isError": false
        }))
        .unwrap();
        assert_eq!(result.texts(), vec!["first", "second"]);
        assert_eq!(result.joined_text(), "first\nsecond");
        assert!(!result.is_error);
    }

    #[test]
    fn sse_body_skips_notifications() {
        let body = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n",
            "\n",
            "event: message\r\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"tools\":[]}}\r\n",
        );
        let resp = response_from_sse(body, 7).unwrap();
        assert_eq!(resp.result, Some(json!({"tools": []})));
        assert!(response_from_sse(body, 8).is_none());
    }
}
