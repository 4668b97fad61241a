//! Feed domain types: items, preferences, sources, and ranked results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A parsed feed entry before it is stored.
///
/// `published` is the raw date string as it appeared in the feed; the store
/// normalizes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFeedItem {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub published: String,
    /// Feed URL the entry came from
    #[serde(default)]
    pub source: String,
}

/// A stored feed item. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source: String,
    /// Canonical `YYYY-MM-DD HH:MM:SS`
    pub published: String,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl FeedItem {
    /// The text that gets embedded for this item.
    pub fn document(&self) -> String {
        document_text(&self.title, &self.summary)
    }

    /// Calendar date part of `published`.
    pub fn published_date(&self) -> &str {
        self.published.get(..10).unwrap_or(&self.published)
    }
}

/// `title` and `summary` joined the way documents are indexed.
pub fn document_text(title: &str, summary: &str) -> String {
    format!("{title}\n{summary}")
}

/// An explicit like/dislike label on a feed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub feed_id: String,
    pub is_liked: bool,
    /// Only kept for dislikes
    #[serde(default)]
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Preference {
    /// Build a preference stamped now. A reason given with a like is dropped.
    pub fn new(feed_id: impl Into<String>, is_liked: bool, reason: Option<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            is_liked,
            reason: if is_liked { None } else { reason.filter(|r| !r.trim().is_empty()) },
            updated_at: Utc::now(),
        }
    }
}

/// A subscribed feed URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: String,
    pub url: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A feed item as returned by search and recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedItem {
    #[serde(flatten)]
    pub item: FeedItem,

    pub document: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference: Option<Preference>,

    /// Similarity distance, present for search results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,

    /// 0.0 (best) to 1.0 (worst), present for recommendations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference_score: Option<f32>,

    /// `round(preference_score * 100)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference_order: Option<u8>,
}

impl RankedItem {
    pub fn new(item: FeedItem) -> Self {
        let document = item.document();
        Self {
            item,
            document,
            preference: None,
            distance: None,
            preference_score: None,
            preference_order: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.item.id
    }

    /// 0 = liked, 1 = unmarked, 2 = disliked.
    pub fn preference_class(&self) -> u8 {
        match &self.preference {
            Some(p) if p.is_liked => 0,
            None => 1,
            Some(_) => 2,
        }
    }

    /// Record the score and its 0–100 order.
    pub fn set_score(&mut self, score: f32) {
        self.preference_score = Some(score);
        self.preference_order = Some((score.clamp(0.0, 1.0) * 100.0).round() as u8);
    }
}
