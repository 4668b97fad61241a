//! Chat and digest endpoints.
//!
//! Streaming works in one of two ways:
//!
//! 1. The client opens `GET /chat/stream/{session_id}` and keeps it open,
//!    then posts turns to `POST /chat/stream`; each turn's events arrive on
//!    the open channel as `StreamEvent` JSON.
//! 2. The client posts to `POST /chat/stream` with `createStream: true` and
//!    reads the turn from that response, framed as
//!    `{"type": "session_id" | "chunk" | "tool_call" | "end", ...}`.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use feedloom_chat::{ChatReply, ChatRequest, Digest, StreamEvent};
use feedloom_core::message::SessionId;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::SharedState;
use crate::error::ApiResult;

const CHANNEL_CAPACITY: usize = 256;

pub fn chat_router() -> Router<SharedState> {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(stream_turn_handler))
        .route("/chat/stream/{session_id}", get(open_stream_handler))
        .route("/digest", post(digest_handler))
}

async fn chat_handler(State(state): State<SharedState>, Json(payload): Json<ChatRequest>) -> ApiResult<Json<ChatReply>> {
    info!(session_id = ?payload.session_id, model_type = ?payload.model_type, "Chat request");
    Ok(Json(state.chat.send(payload).await?))
}

/// `GET /chat/stream/{session_id}`: delivery channel for later turns.
async fn open_stream_handler(State(state): State<SharedState>, Path(session_id): Path<String>) -> Response {
    info!(session_id = %session_id, "Stream channel opened");
    let rx = state
        .chat
        .streams()
        .open(SessionId::from(&session_id), CHANNEL_CAPACITY)
        .await;

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(SseEvent::default().data(data))
    });
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

#[derive(Debug, Serialize)]
struct StreamStarted {
    session_id: SessionId,
    status: &'static str,
}

/// `POST /chat/stream`: run one streaming turn.
async fn stream_turn_handler(State(state): State<SharedState>, Json(payload): Json<ChatRequest>) -> ApiResult<Response> {
    if !payload.create_stream {
        let session_id = state.chat.stream_to_active(payload).await?;
        let started = StreamStarted {
            session_id,
            status: "streaming",
        };
        return Ok((StatusCode::ACCEPTED, Json(started)).into_response());
    }

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let session_id = state.chat.stream(payload, tx).await?;
    info!(session_id = %session_id, "Direct stream started");

    let opening = futures::stream::iter(vec![WebFrame::SessionId {
        session_id: session_id.to_string(),
    }]);
    let mut announced = false;
    let frames = ReceiverStream::new(rx).flat_map(move |event| futures::stream::iter(web_frames(&event, &mut announced)));

    let stream = opening.chain(frames).map(|frame| {
        let data = serde_json::to_string(&frame).unwrap_or_default();
        Ok::<_, Infallible>(SseEvent::default().data(data))
    });
    Ok(Sse::new(stream).into_response())
}

/// Frames of the direct stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebFrame {
    SessionId { session_id: String },
    Chunk { content: String },
    ToolCall,
    End,
}

/// Frames for one event. `tool_call` is announced once, before the first
/// chunk that carries the flag.
fn web_frames(event: &StreamEvent, announced: &mut bool) -> Vec<WebFrame> {
    let mut frames = Vec::with_capacity(2);
    if event.has_tool_call && !*announced {
        *announced = true;
        frames.push(WebFrame::ToolCall);
    }
    if !event.chunk.is_empty() {
        frames.push(WebFrame::Chunk {
            content: event.chunk.clone(),
        });
    }
    if event.is_final {
        frames.push(WebFrame::End);
    }
    frames
}

#[derive(Debug, Default, Deserialize)]
struct DigestRequest {
    #[serde(default, alias = "modelType")]
    model_type: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    date: Option<String>,
}

async fn digest_handler(State(state): State<SharedState>, payload: Option<Json<DigestRequest>>) -> ApiResult<Json<Digest>> {
    let Json(request) = payload.unwrap_or_default();
    let limit = request.limit.unwrap_or(state.config.recommendation.default_limit);
    let date = request.date.as_deref().map(str::trim).filter(|d| !d.is_empty());
    let digest = state
        .digester
        .digest(request.model_type.as_deref(), limit, date)
        .await?;
    Ok(Json(digest))
}
