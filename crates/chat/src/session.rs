//! Plain chat session: a model, a system prompt and an ordered history.

use std::sync::LazyLock;

use feedloom_core::message::{Message, SessionId};
use feedloom_core::provider::ProviderRequest;
use feedloom_providers::ResolvedModel;
use regex_lite::Regex;
use tracing::{debug, info};

use crate::error::Result;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<think>[\s\S]*?</think>").expect("think pattern is valid"));

/// Remove `<think>...</think>` reasoning blocks emitted by reasoning models.
pub fn strip_reasoning(text: &str) -> String {
    if !text.contains("<think>") {
        return text.to_string();
    }
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

pub struct ChatSession {
    id: SessionId,
    model_type: String,
    model: ResolvedModel,
    system_prompt: String,
    history: Vec<Message>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ChatSession {
    pub fn new(
        id: SessionId,
        model_type: impl Into<String>,
        model: ResolvedModel,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id,
            model_type: model_type.into(),
            model,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn model(&self) -> &ResolvedModel {
        &self.model
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub(crate) fn set_system_prompt(&mut self, prompt: String) {
        self.system_prompt = prompt;
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// System prompt, then history, then `extra` in order.
    pub(crate) fn request(&self, extra: Vec<Message>) -> ProviderRequest {
        let mut messages = Vec::with_capacity(self.history.len() + extra.len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(self.history.iter().cloned());
        messages.extend(extra);

        let mut request = ProviderRequest::new(&self.model.model, messages);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request
    }

    /// Append one finished exchange. Both messages land together or not at all.
    pub(crate) fn commit(&mut self, user: &str, assistant: String) {
        self.history.reserve(2);
        self.history.push(Message::user(user));
        self.history.push(Message::assistant(assistant));
        debug!(session_id = %self.id, messages = self.history.len(), "History updated");
    }

    /// One non-streaming exchange. On failure the history is untouched.
    pub async fn send(&mut self, user_input: &str) -> Result<String> {
        info!(session_id = %self.id, model_type = %self.model_type, "Chat turn");
        let request = self.request(vec![Message::user(user_input)]);
        let response = self.model.provider.complete(request).await?;

        let text = strip_reasoning(&response.message.content);
        self.commit(user_input, text.clone());
        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use feedloom_core::error::ProviderError;
    use feedloom_core::message::Message;
    use feedloom_core::provider::{ChunkStream, Provider, ProviderRequest, ProviderResponse, StreamChunk};
    use feedloom_providers::ResolvedModel;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One scripted model reply.
    #[derive(Clone)]
    pub enum Reply {
        /// Streamed as these fragments; `complete` joins them.
        Text(Vec<&'static str>),
        /// The request fails before any output.
        Fail,
        /// Fragments, then a mid-stream error.
        Broken(Vec<&'static str>),
    }

    /// Replays replies in order; the last one repeats when the script runs out.
    pub struct ScriptedProvider {
        script: Mutex<VecDeque<Reply>>,
        last: Mutex<Option<Reply>>,
        pub requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        pub fn new(script: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn next(&self, request: ProviderRequest) -> Reply {
            self.requests.lock().unwrap().push(request);
            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            match next {
                Some(reply) => {
                    *last = Some(reply.clone());
                    reply
                }
                None => last.clone().unwrap_or(Reply::Text(vec![])),
            }
        }

        pub fn resolved(self: &Arc<Self>) -> ResolvedModel {
            ResolvedModel {
                provider: self.clone(),
                model: "scripted-model".into(),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            match self.next(request) {
                Reply::Text(parts) => Ok(ProviderResponse {
                    message: Message::assistant(parts.concat()),
                    usage: None,
                    model: "scripted-model".into(),
                }),
                Reply::Fail | Reply::Broken(_) => Err(ProviderError::Network("connection reset".into())),
            }
        }

        async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
            let reply = self.next(request);
            let (tx, rx) = tokio::sync::mpsc::channel(64);
            let (parts, broken) = match reply {
                Reply::Fail => return Err(ProviderError::Network("connection refused".into())),
                Reply::Text(parts) => (parts, false),
                Reply::Broken(parts) => (parts, true),
            };
            for part in parts {
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: Some(part.to_string()),
                        ..StreamChunk::default()
                    }))
                    .await;
            }
            let last = if broken {
                Err(ProviderError::StreamInterrupted("socket closed".into()))
            } else {
                Ok(StreamChunk {
                    done: true,
                    ..StreamChunk::default()
                })
            };
            let _ = tx.send(last).await;
            Ok(rx)
        }
    }
}
