//! Create-then-poll bot backend (Coze v3 chat API).
//!
//! A chat is created, its status polled at a fixed interval until it
//! completes or fails, and the answer messages are then fetched and joined.
//! The whole wait is bounded by a hard timeout.

use async_trait::async_trait;
use feedloom_core::error::ProviderError;
use feedloom_core::message::{Message, Role};
use feedloom_core::provider::{Provider, ProviderRequest, ProviderResponse};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct PollingProvider {
    name: String,
    base_url: String,
    api_key: String,
    bot_id: String,
    user_id: String,
    poll_interval: Duration,
    timeout: Duration,
    client: reqwest::Client,
}

impl PollingProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        bot_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bot_id: bot_id.into(),
            user_id: user_id.into(),
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.timeout = timeout;
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, chat: &ChatHandle) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("conversation_id", chat.conversation_id.as_str()), ("chat_id", chat.id.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        parse_envelope(response).await
    }

    async fn create_chat(&self, content: String) -> Result<ChatHandle, ProviderError> {
        let url = format!("{}/v3/chat", self.base_url);
        let body = serde_json::json!({
            "bot_id": self.bot_id,
            "user_id": self.user_id,
            "stream": false,
            "auto_save_history": true,
            "additional_messages": [{
                "role": "user",
                "content": content,
                "content_type": "text",
            }],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        parse_envelope(response).await
    }
}

/// Status of a created chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Created,
    InProgress,
    Completed,
    Failed,
    RequiresAction,
    Canceled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatHandle {
    id: String,
    conversation_id: String,
    #[serde(default = "created")]
    status: ChatStatus,
}

fn created() -> ChatStatus {
    ChatStatus::Created
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct BotMessage {
    role: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
}

async fn parse_envelope<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, ProviderError> {
    let status = response.status().as_u16();
    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed("Invalid bot token".into()));
    }
    if status == 429 {
        return Err(ProviderError::RateLimited { retry_after_secs: 5 });
    }
    if status != 200 {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ApiError { status_code: status, message: body });
    }

    let envelope: Envelope<T> = response.json().await.map_err(|e| ProviderError::ApiError {
        status_code: 200,
        message: format!("Failed to parse bot response: {e}"),
    })?;
    if envelope.code != 0 {
        return Err(ProviderError::ApiError {
            status_code: 200,
            message: format!("bot error {}: {}", envelope.code, envelope.msg),
        });
    }
    envelope.data.ok_or_else(|| ProviderError::ApiError {
        status_code: 200,
        message: "bot response has no data".into(),
    })
}

/// The bot takes a single user turn: the latest user message with the
/// system instructions appended.
pub fn fold_messages(messages: &[Message]) -> String {
    let user = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    if system.is_empty() {
        user.to_string()
    } else {
        format!("{user}\n\n{}", system.join("\n"))
    }
}

fn join_answers(messages: Vec<BotMessage>) -> String {
    messages
        .into_iter()
        .filter(|m| m.role == "assistant" && (m.kind.is_empty() || m.kind == "answer"))
        .map(|m| m.content)
        .collect()
}

/// Poll `check` every `interval` until it reports a terminal status.
///
/// Fails with `Timeout` once `limit` has elapsed.
pub async fn poll_until_done<F, Fut>(interval: Duration, limit: Duration, mut check: F) -> Result<(), ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ChatStatus, ProviderError>>,
{
    let wait = async {
        loop {
            match check().await? {
                ChatStatus::Completed => return Ok(()),
                ChatStatus::Failed | ChatStatus::Canceled => {
                    return Err(ProviderError::ApiError {
                        status_code: 200,
                        message: "Chat failed".into(),
                    });
                }
                status => debug!(?status, "Chat not finished yet"),
            }
            tokio::time::sleep(interval).await;
        }
    };

    tokio::time::timeout(limit, wait)
        .await
        .map_err(|_| ProviderError::Timeout(format!("no response after {}s", limit.as_secs())))?
}

#[async_trait]
impl Provider for PollingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if self.bot_id.is_empty() {
            return Err(ProviderError::NotConfigured(format!("{}: bot_id is not set", self.name)));
        }

        let handle = self.create_chat(fold_messages(&request.messages)).await?;
        info!(provider = %self.name, chat_id = %handle.id, "Bot chat created");

        if handle.status != ChatStatus::Completed {
            let chat = &handle;
            poll_until_done(self.poll_interval, self.timeout, move || async move {
                let current: ChatHandle = self.get_json("/v3/chat/retrieve", chat).await?;
                Ok(current.status)
            })
            .await
            .inspect_err(|e| warn!(provider = %self.name, error = %e, "Bot chat did not complete"))?;
        }

        let messages: Vec<BotMessage> = self.get_json("/v3/chat/message/list", &handle).await?;
        Ok(ProviderResponse {
            message: Message::assistant(join_answers(messages)),
            usage: None,
            model: self.bot_id.clone(),
        })
    }
}
