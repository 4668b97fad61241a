//! In-memory backends for tests and ephemeral runs.

use async_trait::async_trait;
use feedloom_core::embedding::Embedder;
use feedloom_core::error::StoreError;
use feedloom_core::feed::{FeedSource, Preference};
use feedloom_core::store::{IndexEntry, IndexHit, MetadataFilter, PreferenceDb, VectorIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::vector;

/// A vector index that keeps documents and their embeddings in a Vec.
pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: Arc<RwLock<Vec<(IndexEntry, Vec<f32>)>>>,
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add(&self, entries: Vec<IndexEntry>) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let documents: Vec<String> = entries.iter().map(|e| e.document.clone()).collect();
        let embeddings = self.embedder.embed(&documents).await?;
        if embeddings.len() != entries.len() {
            return Err(StoreError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                entries.len(),
                embeddings.len()
            )));
        }

        let mut stored = self.entries.write().await;
        for (entry, embedding) in entries.into_iter().zip(embeddings) {
            if stored.iter().any(|(e, _)| e.id == entry.id) {
                return Err(StoreError::Storage(format!("duplicate id {}", entry.id)));
            }
            stored.push((entry, embedding));
        }
        Ok(())
    }

    async fn query(&self, text: Option<&str>, n: usize) -> Result<Vec<IndexHit>, StoreError> {
        let all = self.get(None).await?;
        match text {
            Some(text) => {
                let query = self.embedder.embed_one(text).await?;
                Ok(vector::nearest(all, &query, n))
            }
            None => Ok(all.into_iter().take(n).collect()),
        }
    }

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<IndexHit>, StoreError> {
        let stored = self.entries.read().await;
        Ok(stored
            .iter()
            .filter(|(entry, _)| filter.is_none_or(|f| f.matches(entry)))
            .map(|(entry, embedding)| IndexHit {
                entry: entry.clone(),
                distance: None,
                embedding: Some(embedding.clone()),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().await.len())
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Preferences and sources held in maps.
pub struct InMemoryPreferences {
    preferences: RwLock<HashMap<String, Preference>>,
    sources: RwLock<Vec<FeedSource>>,
}

impl InMemoryPreferences {
    pub fn new() -> Self {
        Self {
            preferences: RwLock::new(HashMap::new()),
            sources: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryPreferences {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreferenceDb for InMemoryPreferences {
    async fn upsert_preference(&self, preference: Preference) -> Result<(), StoreError> {
        self.preferences
            .write()
            .await
            .insert(preference.feed_id.clone(), preference);
        Ok(())
    }

    async fn find_preference(&self, feed_id: &str) -> Result<Option<Preference>, StoreError> {
        Ok(self.preferences.read().await.get(feed_id).cloned())
    }

    async fn find_preferences(&self) -> Result<Vec<Preference>, StoreError> {
        let mut all: Vec<Preference> = self.preferences.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.feed_id.cmp(&b.feed_id));
        Ok(all)
    }

    async fn insert_source(&self, source: FeedSource) -> Result<bool, StoreError> {
        let mut sources = self.sources.write().await;
        if sources.iter().any(|s| s.url == source.url) {
            return Ok(false);
        }
        sources.push(source);
        Ok(true)
    }

    async fn list_sources(&self) -> Result<Vec<FeedSource>, StoreError> {
        let mut sources = self.sources.read().await.clone();
        sources.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sources)
    }

    async fn delete_source(&self, id: &str) -> Result<bool, StoreError> {
        let mut sources = self.sources.write().await;
        let len_before = sources.len();
        sources.retain(|s| s.id != id);
        Ok(sources.len() < len_before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::TokenHashEmbedder;
    use chrono::{Duration, Utc};
    use feedloom_core::store::ItemMetadata;

    fn entry(id: &str, document: &str, link: &str) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            document: document.into(),
            metadata: ItemMetadata {
                title: document.lines().next().unwrap_or_default().into(),
                link: link.into(),
                pub_date: "2025-05-16 00:00:00".into(),
                source: "https://example.com/feed".into(),
            },
        }
    }

    fn index() -> InMemoryIndex {
        InMemoryIndex::new(Arc::new(TokenHashEmbedder::new(128)))
    }

    #[tokio::test]
    async fn add_query_and_count() {
        let idx = index();
        idx.add(vec![
            entry("a", "rust compiler release\nfaster builds", "https://x/a"),
            entry("b", "gardening tomatoes\nsummer tips", "https://x/b"),
        ])
        .await
        .unwrap();

        assert_eq!(idx.count().await.unwrap(), 2);
        let hits = idx.query(Some("rust compiler"), 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.id, "a");
        assert!(hits[0].distance.is_some());
    }

    #[tokio::test]
    async fn get_with_filter_and_delete_collection() {
        let idx = index();
        idx.add(vec![entry("a", "one", "https://x/a"), entry("b", "two", "https://x/b")])
            .await
            .unwrap();

        let hits = idx.get(Some(&MetadataFilter::Link("https://x/b".into()))).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.id, "b");

        idx.delete_collection().await.unwrap();
        assert_eq!(idx.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_id_rejected() {
        let idx = index();
        idx.add(vec![entry("a", "one", "https://x/a")]).await.unwrap();
        let err = idx.add(vec![entry("a", "again", "https://x/a2")]).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[tokio::test]
    async fn preference_upsert_latest_wins() {
        let db = InMemoryPreferences::new();
        db.upsert_preference(Preference::new("f1", false, Some("boring".into()))).await.unwrap();
        db.upsert_preference(Preference::new("f1", true, None)).await.unwrap();

        let pref = db.find_preference("f1").await.unwrap().unwrap();
        assert!(pref.is_liked);
        assert!(pref.reason.is_none());
        assert_eq!(db.find_preferences().await.unwrap().len(), 1);
        assert!(db.find_preference("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sources_dedup_and_sort_newest_first() {
        let db = InMemoryPreferences::new();
        let now = Utc::now();
        let older = FeedSource {
            id: "s1".into(),
            url: "https://a/feed".into(),
            name: "A".into(),
            created_at: now - Duration::hours(1),
            updated_at: now - Duration::hours(1),
        };
        let newer = FeedSource { id: "s2".into(), url: "https://b/feed".into(), created_at: now, updated_at: now, ..older.clone() };

        assert!(db.insert_source(older.clone()).await.unwrap());
        assert!(db.insert_source(newer).await.unwrap());
        assert!(!db.insert_source(FeedSource { id: "s3".into(), ..older }).await.unwrap());

        let listed = db.list_sources().await.unwrap();
        assert_eq!(listed.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["s2", "s1"]);

        assert!(db.delete_source("s1").await.unwrap());
        assert!(!db.delete_source("s1").await.unwrap());
    }
}
