//! Centroid preference model.
//!
//! Scores are in `[0, 1]`, lower meaning closer to what the user liked and
//! further from what they disliked. The model is always rebuilt from scratch.

use feedloom_core::embedding::Embedder;
use feedloom_core::error::StoreError;
use feedloom_core::feed::{FeedItem, Preference};
use feedloom_store::{cosine_similarity, mean_vector};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Score given when there is nothing to compare against.
pub const NEUTRAL_SCORE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceModel {
    #[serde(skip)]
    pub liked_centroid: Option<Vec<f32>>,
    #[serde(skip)]
    pub disliked_centroid: Option<Vec<f32>>,
    pub liked_count: usize,
    pub disliked_count: usize,
}

impl PreferenceModel {
    /// Build centroids from already embedded members of each class.
    pub fn from_embeddings(liked: &[Vec<f32>], disliked: &[Vec<f32>]) -> Self {
        Self {
            liked_centroid: mean_vector(liked.iter().map(Vec::as_slice)),
            disliked_centroid: mean_vector(disliked.iter().map(Vec::as_slice)),
            liked_count: liked.len(),
            disliked_count: disliked.len(),
        }
    }

    /// Train from explicit preferences.
    ///
    /// Returns `None` when fewer than `min_labeled` preferences exist, or
    /// when none of the labelled items can be found. `items` are the stored
    /// items for the labelled ids; items without a stored embedding are
    /// embedded in one batch.
    pub async fn train(
        preferences: &[Preference],
        items: &[FeedItem],
        embedder: &dyn Embedder,
        min_labeled: usize,
    ) -> Result<Option<Self>, StoreError> {
        let liked_total = preferences.iter().filter(|p| p.is_liked).count();
        let disliked_total = preferences.len() - liked_total;
        info!(liked = liked_total, disliked = disliked_total, "Preference statistics");

        if preferences.len() < min_labeled {
            info!(min_labeled, "Not enough labelled items to train a preference model");
            return Ok(None);
        }

        let labels: HashMap<&str, bool> = preferences
            .iter()
            .map(|p| (p.feed_id.as_str(), p.is_liked))
            .collect();
        let labelled: Vec<(&FeedItem, bool)> = items
            .iter()
            .filter_map(|item| labels.get(item.id.as_str()).map(|liked| (item, *liked)))
            .collect();

        if labelled.is_empty() {
            warn!("None of the labelled feed items are stored; no preference model");
            return Ok(None);
        }

        let embeddings = embed_missing(labelled.iter().map(|(item, _)| *item), embedder).await?;

        let mut liked = Vec::new();
        let mut disliked = Vec::new();
        for ((_, is_liked), embedding) in labelled.iter().zip(embeddings) {
            if *is_liked {
                liked.push(embedding);
            } else {
                disliked.push(embedding);
            }
        }

        let model = Self::from_embeddings(&liked, &disliked);
        info!(
            liked = model.liked_count,
            disliked = model.disliked_count,
            "Preference model trained"
        );
        Ok(Some(model))
    }

    /// Score one embedding against this model.
    pub fn score(&self, embedding: &[f32]) -> f32 {
        let liked = self.liked_centroid.as_deref().map(|c| cosine_similarity(embedding, c));
        let disliked = self.disliked_centroid.as_deref().map(|c| cosine_similarity(embedding, c));

        let raw = match (liked, disliked) {
            (None, None) => return NEUTRAL_SCORE,
            (Some(l), None) => 1.0 - l,
            (None, Some(d)) => d,
            (Some(l), Some(d)) => 1.0 - l + d,
        };
        raw.clamp(0.0, 1.0)
    }
}

/// Score an embedding against an optional model; no model is neutral.
pub fn score(embedding: &[f32], model: Option<&PreferenceModel>) -> f32 {
    model.map_or(NEUTRAL_SCORE, |m| m.score(embedding))
}

/// Embeddings for `items` in order, embedding only those without a stored vector.
pub(crate) async fn embed_missing<'a, I>(items: I, embedder: &dyn Embedder) -> Result<Vec<Vec<f32>>, StoreError>
where
    I: IntoIterator<Item = &'a FeedItem>,
{
    let items: Vec<&FeedItem> = items.into_iter().collect();
    let missing: Vec<String> = items
        .iter()
        .filter(|item| item.embedding.is_none())
        .map(|item| item.document())
        .collect();

    let mut fresh = if missing.is_empty() {
        Vec::new()
    } else {
        embedder.embed(&missing).await?
    }
    .into_iter();

    items
        .iter()
        .map(|item| match &item.embedding {
            Some(e) => Ok(e.clone()),
            None => fresh
                .next()
                .ok_or_else(|| StoreError::EmbeddingFailed("embedder returned too few vectors".into())),
        })
        .collect()
}
