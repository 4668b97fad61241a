//! End-to-end integration tests for feedloom.
//!
//! These tests exercise the full pipeline from ingested feed entries to
//! ranked recommendations, and from a chat message through tool calls to
//! the streamed reply.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use feedloom_chat::{ChatRequest, ChatService, StreamEvent};
use feedloom_config::{AppConfig, ChatConfig, StoreBackend};
use feedloom_core::embedding::Embedder;
use feedloom_core::error::{ProviderError, ToolError};
use feedloom_core::feed::NewFeedItem;
use feedloom_core::message::Message;
use feedloom_core::provider::{Provider, ProviderRequest, ProviderResponse};
use feedloom_core::tool::ToolBackend;
use feedloom_gateway::AppState;
use feedloom_providers::ProviderRouter;
use feedloom_recommend::Recommender;
use feedloom_store::{FeedIngestor, FeedStore, TokenHashEmbedder};
use tokio::sync::mpsc;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted replies in sequence.
struct ScriptedProvider {
    replies: Vec<String>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let reply = self.replies.get(requests.len()).cloned().unwrap_or_else(|| {
            panic!("ScriptedProvider exhausted: call #{}, have {}", requests.len(), self.replies.len())
        });
        requests.push(request);
        Ok(ProviderResponse {
            message: Message::assistant(reply),
            usage: None,
            model: "mock".into(),
        })
    }
}

// ── Mock tool backend ────────────────────────────────────────────────────

/// One tool, `lookup`, that only succeeds for `{"q": "good"}`.
struct PickyBackend {
    calls: Mutex<Vec<serde_json::Value>>,
}

impl PickyBackend {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ToolBackend for PickyBackend {
    fn name(&self) -> &str {
        "picky"
    }

    async fn list_tools(&self) -> Result<Vec<String>, ToolError> {
        Ok(vec!["lookup".into()])
    }

    async fn call(&self, tool: &str, params: serde_json::Value) -> Result<String, ToolError> {
        self.calls.lock().unwrap().push(params.clone());
        if params["q"] == "good" {
            Ok("found it".into())
        } else {
            Err(ToolError::ExecutionFailed {
                tool_name: tool.into(),
                reason: format!("no match for {}", params["q"]),
            })
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn entry(title: &str, summary: &str, published: &str) -> NewFeedItem {
    NewFeedItem {
        title: title.into(),
        link: format!("https://news.example/{}", title.to_lowercase().replace(' ', "-")),
        summary: summary.into(),
        published: published.into(),
        source: String::new(),
    }
}

fn corpus() -> Vec<NewFeedItem> {
    vec![
        entry("Tokio runtime internals", "async rust scheduler tasks", "2025-05-16 08:00:00"),
        entry("Rust async traits", "async rust trait objects futures", "2025-05-16 09:00:00"),
        entry("Borrow checker tips", "rust lifetimes borrow checker", "2025-05-16 10:00:00"),
        entry("Sourdough starter", "bread flour water baking", "2025-05-16 11:00:00"),
        entry("Pizza dough", "bread flour yeast baking oven", "2025-05-16 12:00:00"),
        entry("Axum routing", "async rust web routing handlers", "2025-05-16 13:00:00"),
        entry("Croissant lamination", "butter flour baking pastry", "2025-05-16 14:00:00"),
    ]
}

fn parts() -> (Arc<FeedStore>, Arc<dyn Embedder>) {
    let embedder: Arc<dyn Embedder> = Arc::new(TokenHashEmbedder::new(128));
    (Arc::new(FeedStore::in_memory(embedder.clone())), embedder)
}

fn service(provider: Arc<ScriptedProvider>, tools: Arc<dyn ToolBackend>) -> ChatService {
    let mut router = ProviderRouter::new("mock");
    router.register("mock", provider, "mock-model");
    ChatService::new(Arc::new(router), tools, ChatConfig::default())
}

async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let done = event.is_final;
        events.push(event);
        if done {
            break;
        }
    }
    events
}

// ── E2E: ingest → preferences → recommendations ─────────────────────────

#[tokio::test]
async fn e2e_ingest_label_and_recommend() {
    let (store, embedder) = parts();
    let ingestor = FeedIngestor::new(store.clone());

    let report = ingestor.ingest("https://news.example/feed", corpus()).await.unwrap();
    assert_eq!(report.stored, 7);

    // Re-ingesting the same feed stores nothing new.
    let again = ingestor.ingest("https://news.example/feed", corpus()).await.unwrap();
    assert_eq!(again.stored, 0);
    assert_eq!(again.skipped, 7);

    let items = store.get_all(100, None).await.unwrap();
    let id_of = |title: &str| items.iter().find(|i| i.title == title).unwrap().id.clone();

    store.store_preference(&id_of("Tokio runtime internals"), true, None).await.unwrap();
    store.store_preference(&id_of("Rust async traits"), true, None).await.unwrap();
    store.store_preference(&id_of("Borrow checker tips"), true, None).await.unwrap();
    store
        .store_preference(&id_of("Sourdough starter"), false, Some("not about code".into()))
        .await
        .unwrap();
    store.store_preference(&id_of("Pizza dough"), false, None).await.unwrap();

    let recommender = Recommender::new(store.clone(), embedder);
    let status = recommender.refresh().await.unwrap();
    assert!(status.trained);
    assert_eq!(status.liked_count, 3);
    assert_eq!(status.disliked_count, 2);

    let ranked = recommender.recommend(10, Some("2025-05-16"), None).await.unwrap();
    assert_eq!(ranked.len(), 7);

    // Liked first, disliked last, unlabelled in between by similarity.
    assert!(ranked[..3].iter().all(|r| r.preference_order == Some(0)));
    assert!(ranked[5..].iter().all(|r| r.preference_order == Some(100)));
    let axum = ranked.iter().position(|r| r.item.title == "Axum routing").unwrap();
    let croissant = ranked.iter().position(|r| r.item.title == "Croissant lamination").unwrap();
    assert!(axum < croissant, "rust item should outrank pastry for a rust reader");

    let reasons = store.get_disliked_reasons().await.unwrap();
    assert_eq!(reasons.len(), 1);
    assert_eq!(reasons[0].reason.as_deref(), Some("not about code"));
}

#[tokio::test]
async fn e2e_recommend_without_enough_labels_is_neutral() {
    let (store, embedder) = parts();
    FeedIngestor::new(store.clone())
        .ingest("https://news.example/feed", corpus())
        .await
        .unwrap();

    let recommender = Recommender::new(store, embedder);
    let ranked = recommender.recommend(3, None, None).await.unwrap();
    assert_eq!(ranked.len(), 3);
    assert!(ranked.iter().all(|r| r.preference_order == Some(50)));
}

// ── E2E: chat with built-in tools ────────────────────────────────────────

#[tokio::test]
async fn e2e_chat_calls_search_feeds() {
    let (store, embedder) = parts();
    FeedIngestor::new(store.clone())
        .ingest("https://news.example/feed", corpus())
        .await
        .unwrap();
    let recommender = Arc::new(Recommender::new(store.clone(), embedder));
    let tools: Arc<dyn ToolBackend> = Arc::new(feedloom_tools::default_registry(store, recommender));

    let provider = Arc::new(ScriptedProvider::new(&[
        "Let me look.\n```mcp\n{\"tool\": \"search_feeds\", \"params\": {\"query\": \"sourdough bread\", \"n\": 1}}\n```",
        "You asked about bread before.",
    ]));
    let chat = service(provider.clone(), tools);

    let reply = chat.send(ChatRequest::new("anything on bread?")).await.unwrap();
    assert!(reply.has_tool_call);
    assert!(reply.response.starts_with("Let me look."));
    assert!(reply.response.contains("✅ Tool 'search_feeds' result:"));
    assert!(reply.response.contains("Sourdough starter"));
    assert!(!reply.response.contains("```mcp"));

    // The tool list is advertised in the system prompt.
    let system = &provider.last_request().messages[0];
    assert!(system.content.contains("- search_feeds"));
    assert!(system.content.contains("- recommend_feeds"));

    // Follow-up in the same session sees the substituted reply.
    let follow = chat
        .send(ChatRequest::new("thanks").in_session(reply.session_id.as_str()))
        .await
        .unwrap();
    assert_eq!(follow.session_id, reply.session_id);
    assert!(!follow.has_tool_call);
    let history = &provider.last_request().messages;
    assert_eq!(history.len(), 4);
    assert!(history[2].content.contains("Sourdough starter"));
}

// ── E2E: streaming with tool retries ─────────────────────────────────────

#[tokio::test]
async fn e2e_stream_retries_tool_with_corrected_params() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "```mcp\n{\"tool\": \"lookup\", \"params\": {\"q\": \"bad\"}}\n```",
        "{\"tool\": \"lookup\", \"params\": {\"q\": \"worse\"}}",
        "{\"tool\": \"lookup\", \"params\": {\"q\": \"good\"}}",
    ]));
    let backend = Arc::new(PickyBackend::new());
    let chat = service(provider.clone(), backend.clone());

    let (tx, rx) = mpsc::channel(64);
    let session_id = chat.stream(ChatRequest::new("find it"), tx).await.unwrap();
    let events = collect(rx).await;

    let last = events.last().unwrap();
    assert!(last.is_final);
    assert!(last.chunk.is_empty());
    assert!(last.has_tool_call);
    assert_eq!(events.iter().filter(|e| e.is_final).count(), 1);

    let text: String = events.iter().map(|e| e.chunk.as_str()).collect();
    assert!(text.contains("attempt 2/5"));
    assert!(text.contains("attempt 3/5"));
    assert!(text.contains("found it"));

    assert_eq!(backend.calls.lock().unwrap().len(), 3);
    assert_eq!(provider.calls(), 3);

    // The correction request carries the failed call and its reason.
    let correction = provider.last_request();
    let asked = &correction.messages.last().unwrap().content;
    assert!(asked.contains("'lookup'"));
    assert!(asked.contains("no match"));

    // The turn is committed with the tool output in place of the directive.
    let session = chat.sessions().get(&session_id).await.unwrap();
    let session = session.lock().await;
    assert_eq!(session.history().len(), 2);
    assert!(session.history()[1].content.contains("found it"));
}

#[tokio::test]
async fn e2e_stream_without_tools_ends_with_one_final_event() {
    let provider = Arc::new(ScriptedProvider::new(&["plain answer"]));
    let chat = service(provider, Arc::new(PickyBackend::new()));

    let (tx, rx) = mpsc::channel(16);
    chat.stream(ChatRequest::new("hi"), tx).await.unwrap();
    let events = collect(rx).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], StreamEvent::chunk("plain answer", false));
    assert_eq!(events[1], StreamEvent::finished(false));
}

// ── E2E: gateway and configuration ───────────────────────────────────────

fn memory_state(provider: Arc<ScriptedProvider>) -> AppState {
    let mut config = AppConfig::default();
    config.store.backend = StoreBackend::Memory;
    config.default_model_type = "mock".into();
    let (store, embedder) = parts();
    let mut router = ProviderRouter::new("mock");
    router.register("mock", provider, "mock-model");
    AppState::assemble(config, store, embedder, router)
}

#[tokio::test]
async fn e2e_gateway_health_and_chat() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let app = feedloom_gateway::build_router(Arc::new(memory_state(Arc::new(ScriptedProvider::new(&["hello"])))));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"message": "hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["response"], "hello");
    assert_eq!(json["has_tool_call"], false);
    assert!(json["session_id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn e2e_config_file_and_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("feeds.db");
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
default_model_type = "ollama"

[store]
backend = "sqlite"
path = '{}'

[recommendation]
default_limit = 3
"#,
            db_path.display()
        ),
    )
    .unwrap();

    let config = AppConfig::load_from(&config_path).unwrap();
    assert_eq!(config.default_model_type, "ollama");
    assert_eq!(config.recommendation.default_limit, 3);
    assert_eq!(config.store.resolved_path(), db_path);

    let state = AppState::build(config).await.unwrap();
    let report = state.ingestor.ingest("https://news.example/feed", corpus()).await.unwrap();
    assert_eq!(report.stored, 7);
    drop(state);

    // Items survive a reopen of the same file.
    let reopened = AppState::build(AppConfig::load_from(&config_path).unwrap()).await.unwrap();
    assert_eq!(reopened.store.count().await.unwrap(), 7);
    let found = reopened.store.search("sourdough bread", 1).await.unwrap();
    assert_eq!(found[0].item.title, "Sourdough starter");
}

#[test]
fn e2e_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "default_model_type = \"nowhere\"\n").unwrap();
    assert!(AppConfig::load_from(&path).is_err());
}
