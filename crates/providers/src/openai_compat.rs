//! OpenAI-compatible chat backend.
//!
//! Covers DeepSeek, OpenAI, Ollama and anything else exposing
//! `/chat/completions` and `/embeddings`. Streaming reads the SSE body and
//! forwards each content delta as a `StreamChunk`.

use async_trait::async_trait;
use feedloom_core::error::ProviderError;
use feedloom_core::message::Message;
use feedloom_core::provider::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn deepseek(api_key: impl Into<String>) -> Self {
        Self::new("deepseek", "https://api.deepseek.com/v1", api_key)
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Ollama ignores the key, but the header must still be present.
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new("ollama", base_url.unwrap_or("http://localhost:11434/v1"), "ollama")
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.to_string(),
                content: Some(m.content.clone()),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    async fn post(&self, path: &str, body: &serde_json::Value, sse: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if sse {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        check_status(response).await
    }
}

/// Map non-success statuses onto provider errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        return Err(ProviderError::RateLimited { retry_after_secs: 5 });
    }
    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }
    if status != 200 {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }
    Ok(response)
}

/// Splits an SSE byte stream into lines.
///
/// Bytes are held until a newline arrives, so a UTF-8 character split
/// across network chunks is decoded whole.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            lines.push(String::from_utf8_lossy(&line[..end]).into_owned());
        }
        lines
    }
}

/// One parsed line of an SSE body.
#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Content(String),
    Done(Option<Usage>),
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done(None);
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            if let Some(usage) = resp.usage {
                return SseLine::Done(Some(usage.into()));
            }
            resp.choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|c| !c.is_empty())
                .map_or(SseLine::Skip, SseLine::Content)
        }
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            SseLine::Skip
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let body = Self::request_body(&request, false);
        let response = self.post("/chat/completions", &body, false).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage: api_response.usage.map(Into::into),
            model: api_response.model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let body = Self::request_body(&request, true);
        let response = self.post("/chat/completions", &body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = LineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };
                for line in buffer.push(&bytes) {
                    match parse_sse_line(&line) {
                        SseLine::Skip => {}
                        SseLine::Content(text) => {
                            let chunk = StreamChunk {
                                content: Some(text),
                                ..StreamChunk::default()
                            };
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Done(usage) => {
                            let _ = tx
                                .send(Ok(StreamChunk {
                                    content: None,
                                    done: true,
                                    usage,
                                }))
                                .await;
                            return;
                        }
                    }
                }
            }

            // Body ended without [DONE]
            let _ = tx
                .send(Ok(StreamChunk {
                    done: true,
                    ..StreamChunk::default()
                }))
                .await;
        });

        Ok(rx)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });
        let response = self.post("/embeddings", &body, false).await?;

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse embedding response: {e}"),
        })?;

        let mut data = api_resp.data;
        data.sort_by_key(|d| d.index);

        Ok(EmbeddingResponse {
            embeddings: data.into_iter().map(|d| d.embedding).collect(),
            model: api_resp.model,
        })
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deepseek_constructor() {
        let provider = OpenAiCompatProvider::deepseek("sk-test");
        assert_eq!(provider.name(), "deepseek");
        assert_eq!(provider.base_url(), "https://api.deepseek.com/v1");
    }

    #[test]
    fn ollama_constructor_trims_slash() {
        let provider = OpenAiCompatProvider::ollama(Some("http://gpu-box:11434/v1/"));
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.base_url(), "http://gpu-box:11434/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn stream_body_asks_for_usage() {
        let mut req = ProviderRequest::new("deepseek-chat", vec![Message::user("hi")]);
        req.max_tokens = Some(256);
        let body = OpenAiCompatProvider::request_body(&req, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["max_tokens"], 256);

        let body = OpenAiCompatProvider::request_body(&req, false);
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn sse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Content("Hello".into()));
    }

    #[test]
    fn sse_empty_delta_and_comments_are_skipped() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            SseLine::Skip
        );
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line("\r"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: {not json"), SseLine::Skip);
    }

    #[test]
    fn sse_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]\r"), SseLine::Done(None));
    }

    #[test]
    fn sse_usage_finishes_stream() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let usage = Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 };
        assert_eq!(parse_sse_line(line), SseLine::Done(Some(usage)));
    }

    #[test]
    fn line_buffer_keeps_split_characters_whole() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n".as_bytes();
        // Cut inside the three bytes of '你'.
        let cut = line.iter().position(|&b| b == 0xE4).unwrap() + 1;

        let mut buffer = LineBuffer::default();
        assert!(buffer.push(&line[..cut]).is_empty());
        let lines = buffer.push(&line[cut..]);
        assert_eq!(lines.len(), 1);
        assert_eq!(parse_sse_line(&lines[0]), SseLine::Content("你好".into()));
    }

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut buffer = LineBuffer::default();
        assert_eq!(buffer.push(b"data: a\r\ndata: "), vec!["data: a\r".to_string()]);
        assert_eq!(buffer.push(b"b\n\n"), vec!["data: b".to_string(), String::new()]);
    }

    #[test]
    fn parse_embedding_response_orders_by_index() {
        let data = r#"{
            "data": [
                {"embedding": [0.4, 0.5], "index": 1},
                {"embedding": [0.1, 0.2], "index": 0}
            ],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let mut parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
        assert_eq!(parsed.model, "text-embedding-3-small");
    }
}
