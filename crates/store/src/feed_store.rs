//! `FeedStore`: dedup-aware ingestion, similarity search, and preference
//! bookkeeping over a `VectorIndex` and a `PreferenceDb`.
//!
//! Collaborator rows are converted to `FeedItem` / `RankedItem` here and
//! nowhere else.

use chrono::Utc;
use feedloom_core::embedding::Embedder;
use feedloom_core::error::StoreError;
use feedloom_core::feed::{document_text, FeedItem, FeedSource, NewFeedItem, Preference, RankedItem};
use feedloom_core::store::{IndexEntry, IndexHit, ItemMetadata, MetadataFilter, PreferenceDb, VectorIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dates::{filter_date, normalize_date};
use crate::in_memory::{InMemoryIndex, InMemoryPreferences};

pub struct FeedStore {
    index: Arc<dyn VectorIndex>,
    preferences: Arc<dyn PreferenceDb>,
    /// Serializes the exists-check and insert of `store_item`.
    write_lock: Mutex<()>,
}

impl FeedStore {
    pub fn new(index: Arc<dyn VectorIndex>, preferences: Arc<dyn PreferenceDb>) -> Self {
        Self {
            index,
            preferences,
            write_lock: Mutex::new(()),
        }
    }

    /// A store that lives only in process memory.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self::new(
            Arc::new(InMemoryIndex::new(embedder)),
            Arc::new(InMemoryPreferences::new()),
        )
    }

    /// A store backed by one SQLite file for both collaborators.
    #[cfg(feature = "sqlite")]
    pub async fn sqlite(path: &str, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        let db = Arc::new(crate::sqlite::SqliteStore::new(path, embedder).await?);
        Ok(Self::new(db.clone(), db))
    }

    /// Store a parsed entry. Returns `None` when an item with the same link,
    /// or the same title from the same source, is already stored.
    pub async fn store_item(&self, item: NewFeedItem) -> Result<Option<String>, StoreError> {
        let _guard = self.write_lock.lock().await;

        if !item.link.is_empty()
            && !self.index.get(Some(&MetadataFilter::Link(item.link.clone()))).await?.is_empty()
        {
            debug!(link = %item.link, "Skipping duplicate link");
            return Ok(None);
        }

        let same_title = MetadataFilter::TitleAndSource {
            title: item.title.clone(),
            source: item.source.clone(),
        };
        if !self.index.get(Some(&same_title)).await?.is_empty() {
            debug!(title = %item.title, source = %item.source, "Skipping duplicate title");
            return Ok(None);
        }

        let id = format!("feed_{}", Uuid::new_v4().simple());
        let entry = IndexEntry {
            id: id.clone(),
            document: document_text(&item.title, &item.summary),
            metadata: ItemMetadata {
                title: item.title,
                link: item.link,
                pub_date: normalize_date(&item.published),
                source: item.source,
            },
        };
        self.index.add(vec![entry]).await?;
        Ok(Some(id))
    }

    /// Items sorted by published date, newest first. `date` keeps only items
    /// published on that calendar day; an unparseable date matches nothing.
    pub async fn get_all(&self, limit: usize, date: Option<&str>) -> Result<Vec<FeedItem>, StoreError> {
        let day = match date {
            Some(raw) => match filter_date(raw) {
                Some(day) => Some(day),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let mut items: Vec<FeedItem> = self
            .index
            .get(None)
            .await?
            .into_iter()
            .map(hit_to_item)
            .filter(|item| day.as_deref().is_none_or(|d| item.published_date() == d))
            .collect();

        items.sort_by(|a, b| b.published.cmp(&a.published));
        items.truncate(limit);
        Ok(items)
    }

    /// Items by id, in store order. Unknown ids are ignored.
    pub async fn get_items(&self, ids: &[String]) -> Result<Vec<FeedItem>, StoreError> {
        let hits = self.index.get(Some(&MetadataFilter::Ids(ids.to_vec()))).await?;
        Ok(hits.into_iter().map(hit_to_item).collect())
    }

    /// Similarity search, annotated with stored preferences and ordered
    /// liked, then unmarked, then disliked (similarity order within each).
    pub async fn search(&self, query: &str, n: usize) -> Result<Vec<RankedItem>, StoreError> {
        let hits = self.index.query(Some(query), n).await?;
        let preferences = self.preferences_by_id().await?;

        let mut results: Vec<RankedItem> = hits
            .into_iter()
            .map(|hit| {
                let distance = hit.distance;
                let mut ranked = RankedItem::new(hit_to_item(hit));
                ranked.distance = distance;
                ranked.preference = preferences.get(ranked.id()).cloned();
                ranked
            })
            .collect();

        results.sort_by_key(RankedItem::preference_class);
        Ok(results)
    }

    pub async fn get_preference(&self, feed_id: &str) -> Result<Option<Preference>, StoreError> {
        self.preferences.find_preference(feed_id).await
    }

    /// Record a like/dislike. The reason is only kept for dislikes.
    pub async fn store_preference(
        &self,
        feed_id: &str,
        is_liked: bool,
        reason: Option<String>,
    ) -> Result<Preference, StoreError> {
        let preference = Preference::new(feed_id, is_liked, reason);
        self.preferences.upsert_preference(preference.clone()).await?;
        debug!(feed_id, is_liked, "Stored preference");
        Ok(preference)
    }

    pub async fn get_all_preferences(&self) -> Result<Vec<Preference>, StoreError> {
        self.preferences.find_preferences().await
    }

    /// All preferences keyed by feed item id.
    pub async fn preferences_by_id(&self) -> Result<HashMap<String, Preference>, StoreError> {
        Ok(self
            .preferences
            .find_preferences()
            .await?
            .into_iter()
            .map(|p| (p.feed_id.clone(), p))
            .collect())
    }

    /// Dislikes that came with a reason.
    pub async fn get_disliked_reasons(&self) -> Result<Vec<Preference>, StoreError> {
        Ok(self
            .preferences
            .find_preferences()
            .await?
            .into_iter()
            .filter(|p| !p.is_liked && p.reason.is_some())
            .collect())
    }

    /// Subscribe a feed URL. Returns `None` if it is already subscribed.
    pub async fn add_source(&self, url: &str, name: Option<&str>) -> Result<Option<FeedSource>, StoreError> {
        let now = Utc::now();
        let source = FeedSource {
            id: format!("src_{}", Uuid::new_v4().simple()),
            url: url.trim().to_string(),
            name: name.map(str::to_string).unwrap_or_else(|| url.trim().to_string()),
            created_at: now,
            updated_at: now,
        };
        if self.preferences.insert_source(source.clone()).await? {
            info!(url = %source.url, "Added feed source");
            Ok(Some(source))
        } else {
            Ok(None)
        }
    }

    pub async fn list_sources(&self) -> Result<Vec<FeedSource>, StoreError> {
        self.preferences.list_sources().await
    }

    pub async fn delete_source(&self, id: &str) -> Result<bool, StoreError> {
        self.preferences.delete_source(id).await
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        self.index.count().await
    }

    /// Drop every stored item. Preferences and sources are kept.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.index.delete_collection().await
    }
}

fn hit_to_item(hit: IndexHit) -> FeedItem {
    let IndexHit { entry, embedding, .. } = hit;
    let summary = match entry.document.split_once('\n') {
        Some((head, rest)) if head == entry.metadata.title => rest.to_string(),
        _ => entry.document.clone(),
    };
    FeedItem {
        id: entry.id,
        title: entry.metadata.title,
        link: entry.metadata.link,
        summary,
        source: entry.metadata.source,
        published: entry.metadata.pub_date,
        embedding,
    }
}
