//! Feed storage, preference and recommendation endpoints.
//!
//! - `GET    /recommendation/rss`          ranked items (`limit`, `date`, `source_id`)
//! - `POST   /recommendation/refresh`      retrain the preference model
//! - `POST   /rss/items`                   ingest parsed entries
//! - `GET    /rss/items`                   stored items, newest first
//! - `GET    /rss/search`                  similarity search
//! - `POST   /rss/preference`              like or dislike an item
//! - `GET    /rss/preference/{feed_id}`
//! - `GET    /rss/preferences/disliked`    dislikes that came with a reason
//! - `GET    /rss/sources`, `POST /rss/sources`, `DELETE /rss/sources/{id}`

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use feedloom_core::feed::{FeedItem, FeedSource, NewFeedItem, Preference, RankedItem};
use feedloom_recommend::RefreshStatus;
use feedloom_store::IngestReport;
use serde::Deserialize;
use tracing::info;

use crate::SharedState;
use crate::error::{ApiError, ApiResult};

const DEFAULT_ITEMS: usize = 100;
const DEFAULT_SEARCH: usize = 10;

pub fn rss_router() -> Router<SharedState> {
    Router::new()
        .route("/recommendation/rss", get(recommend_handler))
        .route("/recommendation/refresh", post(refresh_handler))
        .route("/rss/items", post(ingest_handler).get(list_items_handler))
        .route("/rss/search", get(search_handler))
        .route("/rss/preference", post(store_preference_handler))
        .route("/rss/preference/{feed_id}", get(get_preference_handler))
        .route("/rss/preferences/disliked", get(disliked_handler))
        .route("/rss/sources", get(list_sources_handler).post(add_source_handler))
        .route("/rss/sources/{id}", delete(delete_source_handler))
}

#[derive(Debug, Deserialize)]
struct RecommendQuery {
    limit: Option<usize>,
    date: Option<String>,
    /// Feed URL of the source to keep
    source_id: Option<String>,
}

async fn recommend_handler(
    State(state): State<SharedState>,
    Query(query): Query<RecommendQuery>,
) -> ApiResult<Json<Vec<RankedItem>>> {
    let limit = query.limit.unwrap_or(state.config.recommendation.default_limit);
    let items = state
        .recommender
        .recommend(limit, non_blank(&query.date), non_blank(&query.source_id))
        .await?;
    Ok(Json(items))
}

async fn refresh_handler(State(state): State<SharedState>) -> ApiResult<Json<RefreshStatus>> {
    Ok(Json(state.recommender.refresh().await?))
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    /// Feed URL, used for entries that don't carry their own `source`
    #[serde(default, alias = "source")]
    source_url: String,
    entries: Vec<NewFeedItem>,
}

async fn ingest_handler(
    State(state): State<SharedState>,
    Json(payload): Json<IngestRequest>,
) -> ApiResult<Json<IngestReport>> {
    info!(source = %payload.source_url, entries = payload.entries.len(), "Ingesting feed entries");
    let report = state.ingestor.ingest(&payload.source_url, payload.entries).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct ItemsQuery {
    limit: Option<usize>,
    date: Option<String>,
}

async fn list_items_handler(
    State(state): State<SharedState>,
    Query(query): Query<ItemsQuery>,
) -> ApiResult<Json<Vec<FeedItem>>> {
    let items = state
        .store
        .get_all(query.limit.unwrap_or(DEFAULT_ITEMS), non_blank(&query.date))
        .await?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    query: String,
    n: Option<usize>,
}

async fn search_handler(
    State(state): State<SharedState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<RankedItem>>> {
    if query.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".into()));
    }
    let hits = state.store.search(&query.query, query.n.unwrap_or(DEFAULT_SEARCH)).await?;
    Ok(Json(hits))
}

#[derive(Debug, Deserialize)]
struct PreferenceRequest {
    #[serde(alias = "feedId")]
    feed_id: String,
    #[serde(alias = "isLiked")]
    is_liked: bool,
    #[serde(default)]
    reason: Option<String>,
}

async fn store_preference_handler(
    State(state): State<SharedState>,
    Json(payload): Json<PreferenceRequest>,
) -> ApiResult<Json<Preference>> {
    if payload.feed_id.trim().is_empty() {
        return Err(ApiError::BadRequest("feed_id must not be empty".into()));
    }
    let preference = state
        .store
        .store_preference(payload.feed_id.trim(), payload.is_liked, payload.reason)
        .await?;
    Ok(Json(preference))
}

async fn get_preference_handler(
    State(state): State<SharedState>,
    Path(feed_id): Path<String>,
) -> ApiResult<Json<Preference>> {
    state
        .store
        .get_preference(&feed_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no preference for {feed_id}")))
}

async fn disliked_handler(State(state): State<SharedState>) -> ApiResult<Json<Vec<Preference>>> {
    Ok(Json(state.store.get_disliked_reasons().await?))
}

async fn list_sources_handler(State(state): State<SharedState>) -> ApiResult<Json<Vec<FeedSource>>> {
    Ok(Json(state.store.list_sources().await?))
}

#[derive(Debug, Deserialize)]
struct SourceRequest {
    url: String,
    #[serde(default)]
    name: Option<String>,
}

async fn add_source_handler(
    State(state): State<SharedState>,
    Json(payload): Json<SourceRequest>,
) -> ApiResult<(StatusCode, Json<FeedSource>)> {
    if payload.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url must not be empty".into()));
    }
    match state.store.add_source(&payload.url, payload.name.as_deref()).await? {
        Some(source) => Ok((StatusCode::CREATED, Json(source))),
        None => Err(ApiError::Conflict(format!("{} is already subscribed", payload.url.trim()))),
    }
}

async fn delete_source_handler(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    if state.store.delete_source(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no source {id}")))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
