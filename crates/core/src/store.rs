//! Storage collaborator traits.
//!
//! `VectorIndex` is the document store with similarity search (it owns its
//! embedding function); `PreferenceDb` is the key/value side holding
//! preferences and subscribed sources. `FeedStore` composes both.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::feed::{FeedSource, Preference};

/// Metadata stored next to each indexed document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub title: String,
    pub link: String,
    /// Canonical published date
    pub pub_date: String,
    pub source: String,
}

/// One document in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub document: String,
    pub metadata: ItemMetadata,
}

/// A similarity query hit. `distance` is `None` for unranked queries.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub entry: IndexEntry,
    pub distance: Option<f32>,
    pub embedding: Option<Vec<f32>>,
}

/// Exact-match metadata filter for `VectorIndex::get`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    Ids(Vec<String>),
    Link(String),
    TitleAndSource { title: String, source: String },
    Source(String),
}

impl MetadataFilter {
    pub fn matches(&self, entry: &IndexEntry) -> bool {
        match self {
            Self::Ids(ids) => ids.iter().any(|id| id == &entry.id),
            Self::Link(link) => &entry.metadata.link == link,
            Self::TitleAndSource { title, source } => {
                &entry.metadata.title == title && &entry.metadata.source == source
            }
            Self::Source(source) => &entry.metadata.source == source,
        }
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Embed and store documents. Ids must be unique.
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<(), StoreError>;

    /// Nearest `n` documents to `text` by cosine distance, closest first.
    /// With no text, the first `n` documents in insertion order.
    async fn query(&self, text: Option<&str>, n: usize) -> Result<Vec<IndexHit>, StoreError>;

    /// All documents matching the filter, in insertion order, with their
    /// stored embeddings when available.
    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<IndexHit>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    /// Drop every document.
    async fn delete_collection(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PreferenceDb: Send + Sync {
    /// Insert or replace the preference for `preference.feed_id`.
    async fn upsert_preference(&self, preference: Preference) -> Result<(), StoreError>;

    async fn find_preference(&self, feed_id: &str) -> Result<Option<Preference>, StoreError>;

    async fn find_preferences(&self) -> Result<Vec<Preference>, StoreError>;

    /// Insert a source. Returns `false` when the URL is already subscribed.
    async fn insert_source(&self, source: FeedSource) -> Result<bool, StoreError>;

    /// Sources, newest first.
    async fn list_sources(&self) -> Result<Vec<FeedSource>, StoreError>;

    /// Returns `false` when no source had that id.
    async fn delete_source(&self, id: &str) -> Result<bool, StoreError>;
}
