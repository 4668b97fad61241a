//! HTTP API gateway for feedloom.
//!
//! Serves recommendations, feed storage and preferences, chat (plain and
//! streamed over SSE) and LLM digests. [`AppState::build`] wires every
//! subsystem from an [`AppConfig`]; the CLI reuses it for its offline
//! commands.
//!
//! Built on Axum.

pub mod chat;
pub mod error;
pub mod rss;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use feedloom_chat::{ChatService, FeedDigester};
use feedloom_config::{AppConfig, EmbeddingBackend, StoreBackend};
use feedloom_core::embedding::Embedder;
use feedloom_core::error::{Error, StoreError};
use feedloom_providers::{ProviderEmbedder, ProviderRouter};
use feedloom_recommend::Recommender;
use feedloom_store::{FeedIngestor, FeedStore, TokenHashEmbedder};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Everything the handlers need, built once per process.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<FeedStore>,
    pub recommender: Arc<Recommender>,
    pub ingestor: FeedIngestor,
    pub chat: ChatService,
    pub digester: FeedDigester,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Build the store, embedder, model router, tool backend and services
    /// described by `config`.
    pub async fn build(config: AppConfig) -> Result<Self, Error> {
        let router = feedloom_providers::build_from_config(&config);
        let embedder = build_embedder(&config, &router)?;

        let store = match config.store.backend {
            StoreBackend::Memory => {
                info!("Using in-memory feed store");
                FeedStore::in_memory(embedder.clone())
            }
            StoreBackend::Sqlite => {
                let path = config.store.resolved_path();
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StoreError::Storage(format!("Cannot create {}: {e}", parent.display())))?;
                }
                FeedStore::sqlite(&path.to_string_lossy(), embedder.clone()).await?
            }
        };

        Ok(Self::assemble(config, Arc::new(store), embedder, router))
    }

    /// Wire services around an existing store and router.
    pub fn assemble(
        config: AppConfig,
        store: Arc<FeedStore>,
        embedder: Arc<dyn Embedder>,
        router: ProviderRouter,
    ) -> Self {
        let router = Arc::new(router);
        let recommender = Arc::new(Recommender::from_config(store.clone(), embedder, &config.recommendation));
        let tools = feedloom_tools::build_backend(&config.tools, store.clone(), recommender.clone());
        let chat = ChatService::new(router.clone(), tools, config.chat.clone()).with_max_attempts(config.tools.max_attempts);
        let digester = FeedDigester::new(recommender.clone(), router, config.chat.clone());

        Self {
            ingestor: FeedIngestor::new(store.clone()),
            config,
            store,
            recommender,
            chat,
            digester,
        }
    }
}

/// Embedder selected by `[embedding]`.
pub fn build_embedder(config: &AppConfig, router: &ProviderRouter) -> Result<Arc<dyn Embedder>, Error> {
    match config.embedding.backend {
        EmbeddingBackend::Hashing => Ok(Arc::new(TokenHashEmbedder::new(config.embedding.dimensions))),
        EmbeddingBackend::Provider => {
            let resolved = router.resolve(Some(&config.embedding.model_type))?;
            info!(model_type = %config.embedding.model_type, model = %config.embedding.model, "Using provider embeddings");
            Ok(Arc::new(ProviderEmbedder::new(resolved.provider, config.embedding.model.clone())))
        }
    }
}

/// All routes, with tracing and CORS.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(rss::rss_router())
        .merge(chat::chat_router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(8 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the HTTP server and run until it fails.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(AppState::build(config).await?);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
