//! Ranked feed recommendations.

use feedloom_config::RecommendationConfig;
use feedloom_core::embedding::Embedder;
use feedloom_core::error::StoreError;
use feedloom_core::feed::{FeedItem, RankedItem};
use feedloom_store::FeedStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::preference_model::{self, embed_missing, PreferenceModel, NEUTRAL_SCORE};

/// Result of `Recommender::refresh`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub status: &'static str,
    pub message: String,
    pub trained: bool,
    pub liked_count: usize,
    pub disliked_count: usize,
}

pub struct Recommender {
    store: Arc<FeedStore>,
    embedder: Arc<dyn Embedder>,
    candidate_cap: usize,
    min_labeled: usize,
    /// Last trained model. Only `refresh` replaces a trained model.
    model: RwLock<Option<Arc<PreferenceModel>>>,
}

impl Recommender {
    pub fn new(store: Arc<FeedStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self::from_config(store, embedder, &RecommendationConfig::default())
    }

    pub fn from_config(store: Arc<FeedStore>, embedder: Arc<dyn Embedder>, config: &RecommendationConfig) -> Self {
        Self {
            store,
            embedder,
            candidate_cap: config.candidate_cap,
            min_labeled: config.min_labeled,
            model: RwLock::new(None),
        }
    }

    /// The cached model, if one has been trained.
    pub async fn model(&self) -> Option<Arc<PreferenceModel>> {
        self.model.read().await.clone()
    }

    /// Rank stored items for the user.
    ///
    /// Liked items score 0.0 and disliked items 1.0 regardless of the model;
    /// everything else is scored against the preference model. `source`
    /// keeps only items from that feed URL. Results are sorted by ascending
    /// score and truncated to `limit`.
    pub async fn recommend(
        &self,
        limit: usize,
        date: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<RankedItem>, StoreError> {
        let candidates = self.store.get_all(self.candidate_cap, date).await?;
        if candidates.is_empty() {
            warn!("No feed items to recommend");
            return Ok(Vec::new());
        }

        let model = self.ensure_model().await?;
        let preferences = self.store.preferences_by_id().await?;

        let candidates: Vec<FeedItem> = candidates
            .into_iter()
            .filter(|item| source.is_none_or(|s| item.source == s))
            .collect();

        let unlabelled: Vec<&FeedItem> = candidates
            .iter()
            .filter(|item| !preferences.contains_key(&item.id) && !item.document().trim().is_empty())
            .collect();
        let embeddings = if model.is_some() {
            embed_missing(unlabelled.iter().copied(), self.embedder.as_ref()).await?
        } else {
            Vec::new()
        };
        let mut embeddings = embeddings.into_iter();

        let mut ranked: Vec<RankedItem> = candidates
            .into_iter()
            .map(|item| {
                let preference = preferences.get(&item.id).cloned();
                let score = match &preference {
                    Some(p) if p.is_liked => 0.0,
                    Some(_) => 1.0,
                    None if item.document().trim().is_empty() => NEUTRAL_SCORE,
                    None => match embeddings.next() {
                        Some(e) => preference_model::score(&e, model.as_deref()),
                        None => NEUTRAL_SCORE,
                    },
                };
                let mut r = RankedItem::new(item);
                r.preference = preference;
                r.set_score(score);
                r
            })
            .collect();

        ranked.sort_by(|a, b| {
            a.preference_score
                .partial_cmp(&b.preference_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(limit);
        debug!(returned = ranked.len(), "Recommendations ranked");
        Ok(ranked)
    }

    /// Discard the cached model and retrain now.
    pub async fn refresh(&self) -> Result<RefreshStatus, StoreError> {
        let trained = self.train().await?;
        let mut slot = self.model.write().await;
        *slot = trained.clone();

        let status = match trained {
            Some(model) => RefreshStatus {
                status: "success",
                message: "Preference model refreshed".into(),
                trained: true,
                liked_count: model.liked_count,
                disliked_count: model.disliked_count,
            },
            None => RefreshStatus {
                status: "success",
                message: format!(
                    "Preference model cleared: at least {} labelled items are needed",
                    self.min_labeled
                ),
                trained: false,
                liked_count: 0,
                disliked_count: 0,
            },
        };
        info!(trained = status.trained, "Preference model refresh");
        Ok(status)
    }

    /// Cached model, training one if none is cached. An insufficient-data
    /// result is not cached.
    async fn ensure_model(&self) -> Result<Option<Arc<PreferenceModel>>, StoreError> {
        if let Some(model) = self.model.read().await.clone() {
            return Ok(Some(model));
        }

        let trained = self.train().await?;
        if let Some(model) = &trained {
            let mut slot = self.model.write().await;
            // Another caller may have trained meanwhile; keep theirs.
            if slot.is_none() {
                *slot = Some(model.clone());
            }
        }
        Ok(trained)
    }

    async fn train(&self) -> Result<Option<Arc<PreferenceModel>>, StoreError> {
        let preferences = self.store.get_all_preferences().await?;
        if preferences.len() < self.min_labeled {
            debug!(labelled = preferences.len(), "Too few preferences, skipping item lookup");
            return Ok(None);
        }
        let ids: Vec<String> = preferences.iter().map(|p| p.feed_id.clone()).collect();
        let items = self.store.get_items(&ids).await?;
        let model = PreferenceModel::train(&preferences, &items, self.embedder.as_ref(), self.min_labeled).await?;
        Ok(model.map(Arc::new))
    }
}
