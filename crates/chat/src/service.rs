//! Session lookup, creation and turn dispatch for callers outside the crate.

use std::sync::Arc;
use std::time::Duration;

use feedloom_config::ChatConfig;
use feedloom_core::message::SessionId;
use feedloom_core::tool::ToolBackend;
use feedloom_providers::ProviderRouter;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::{ChatError, Result};
use crate::event::{EventSender, StreamEvent};
use crate::prompt;
use crate::registry::{ActiveStreams, InMemorySessionStore, SessionStore, SharedSession};
use crate::session::ChatSession;
use crate::tool_chat::{DEFAULT_MAX_ATTEMPTS, ToolCallingChatSession};

/// One chat turn request. Accepts both snake_case and camelCase field names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,

    #[serde(default)]
    pub message: String,

    #[serde(default, alias = "modelType")]
    pub model_type: Option<String>,

    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: Option<String>,

    /// Deliver the turn on this request's own response instead of a channel
    /// opened earlier.
    #[serde(default, alias = "createStream")]
    pub create_stream: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = Some(model_type.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub session_id: SessionId,
    pub response: String,
    pub has_tool_call: bool,
}

pub struct ChatService {
    router: Arc<ProviderRouter>,
    tools: Arc<dyn ToolBackend>,
    sessions: Arc<dyn SessionStore>,
    streams: Arc<ActiveStreams>,
    config: ChatConfig,
    max_attempts: u32,
}

impl ChatService {
    pub fn new(router: Arc<ProviderRouter>, tools: Arc<dyn ToolBackend>, config: ChatConfig) -> Self {
        let sessions = InMemorySessionStore::new(Duration::from_secs(config.session_ttl_secs), config.max_sessions);
        Self {
            router,
            tools,
            sessions: Arc::new(sessions),
            streams: Arc::new(ActiveStreams::new()),
            config,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn streams(&self) -> &Arc<ActiveStreams> {
        &self.streams
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    /// Existing session for the request, or a new one.
    ///
    /// An existing session keeps the model it was created with.
    async fn session_for(&self, request: &ChatRequest) -> Result<(SessionId, SharedSession)> {
        let id = SessionId::or_generate(request.session_id.as_deref());
        if let Some(session) = self.sessions.get(&id).await {
            if let Some(requested) = request.model_type.as_deref() {
                debug!(session_id = %id, requested, "Keeping the session's original model type");
            }
            return Ok((id, session));
        }

        let resolved = self.router.resolve(request.model_type.as_deref())?;
        let model_type = request
            .model_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(self.router.default_model_type())
            .to_string();
        let system_prompt = request
            .system_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.config.system_prompt.clone());

        let base = ChatSession::new(id.clone(), model_type.as_str(), resolved, system_prompt)
            .with_sampling(self.config.temperature, self.config.max_tokens);
        let session = ToolCallingChatSession::create(base, self.tools.clone())
            .await
            .with_max_attempts(self.max_attempts);
        let shared: SharedSession = Arc::new(Mutex::new(session));
        self.sessions.put(id.clone(), shared.clone()).await;
        info!(session_id = %id, model_type = %model_type, "Chat session created");
        Ok((id, shared))
    }

    /// Non-streaming turn.
    pub async fn send(&self, request: ChatRequest) -> Result<ChatReply> {
        validate(&request)?;
        let (session_id, session) = self.session_for(&request).await?;
        let reply = session.lock().await.send(&request.message).await?;
        Ok(ChatReply {
            session_id,
            response: reply.response,
            has_tool_call: reply.has_tool_call,
        })
    }

    /// Start a streaming turn delivered on `tx` and return its session id.
    ///
    /// Validation and model resolution errors are returned before anything
    /// is sent. Once the turn starts, `tx` always receives a final event,
    /// including when the turn task panics.
    pub async fn stream(&self, request: ChatRequest, tx: EventSender) -> Result<SessionId> {
        validate(&request)?;
        let (session_id, session) = self.session_for(&request).await?;

        let turn_tx = tx.clone();
        let message = request.message;
        let turn = tokio::spawn(async move {
            let mut session = session.lock().await;
            session.stream(&message, &turn_tx).await
        });

        let id = session_id.clone();
        tokio::spawn(async move {
            match turn.await {
                Ok(has_tool_call) => debug!(session_id = %id, has_tool_call, "Streaming turn finished"),
                Err(e) => {
                    error!(session_id = %id, error = %e, "Streaming turn aborted");
                    let _ = tx.send(StreamEvent::chunk(prompt::error_chunk(&e), false)).await;
                    let _ = tx.send(StreamEvent::finished(false)).await;
                }
            }
        });

        Ok(session_id)
    }

    /// Streaming turn delivered on the channel the client opened for its session.
    pub async fn stream_to_active(&self, request: ChatRequest) -> Result<SessionId> {
        let id = match request.session_id.as_deref() {
            Some(id) if !id.trim().is_empty() => SessionId::from(id.trim()),
            _ => return Err(ChatError::Validation("session_id is required".into())),
        };
        let tx = self.streams.get(&id).await?;
        self.stream(request, tx).await
    }
}

fn validate(request: &ChatRequest) -> Result<()> {
    if request.message.trim().is_empty() {
        return Err(ChatError::Validation("message must not be empty".into()));
    }
    Ok(())
}
