//! SQLite backend for both the vector index and the preference database.
//!
//! One database file, three tables:
//! - `feed_items`: documents, metadata, and embeddings (f32 LE blobs)
//! - `preferences`: one row per feed item id
//! - `sources`: subscribed feed URLs
//!
//! Similarity search is a brute-force cosine scan over stored embeddings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedloom_core::embedding::Embedder;
use feedloom_core::error::StoreError;
use feedloom_core::feed::{FeedSource, Preference};
use feedloom_core::store::{
    IndexEntry, IndexHit, ItemMetadata, MetadataFilter, PreferenceDb, VectorIndex,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::vector;

pub struct SqliteStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to ":memory:" is its own database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool, embedder };
        store.init_schema().await?;
        info!("SQLite feed store initialized at {path}");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "feed_items table",
                r#"
                CREATE TABLE IF NOT EXISTS feed_items (
                    iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                    id         TEXT UNIQUE NOT NULL,
                    document   TEXT NOT NULL,
                    title      TEXT NOT NULL,
                    link       TEXT NOT NULL,
                    pub_date   TEXT NOT NULL,
                    source     TEXT NOT NULL,
                    embedding  BLOB
                )
                "#,
            ),
            (
                "link index",
                "CREATE INDEX IF NOT EXISTS idx_feed_items_link ON feed_items(link)",
            ),
            (
                "title/source index",
                "CREATE INDEX IF NOT EXISTS idx_feed_items_title_source ON feed_items(title, source)",
            ),
            (
                "preferences table",
                r#"
                CREATE TABLE IF NOT EXISTS preferences (
                    feed_id    TEXT PRIMARY KEY,
                    is_liked   INTEGER NOT NULL,
                    reason     TEXT,
                    updated_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "sources table",
                r#"
                CREATE TABLE IF NOT EXISTS sources (
                    id         TEXT PRIMARY KEY,
                    url        TEXT UNIQUE NOT NULL,
                    name       TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::SchemaInit(format!("{what}: {e}")))?;
        }

        debug!("SQLite schema ready");
        Ok(())
    }

    fn row_to_hit(row: &sqlx::sqlite::SqliteRow) -> Result<IndexHit, StoreError> {
        let get = |col: &str| -> Result<String, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };

        let embedding = row.try_get::<Option<Vec<u8>>, _>("embedding").ok().flatten();

        Ok(IndexHit {
            entry: IndexEntry {
                id: get("id")?,
                document: get("document")?,
                metadata: ItemMetadata {
                    title: get("title")?,
                    link: get("link")?,
                    pub_date: get("pub_date")?,
                    source: get("source")?,
                },
            },
            distance: None,
            embedding: embedding.map(|blob| blob_to_embedding(&blob)),
        })
    }

    fn row_to_preference(row: &sqlx::sqlite::SqliteRow) -> Result<Preference, StoreError> {
        let is_liked: i64 = row
            .try_get("is_liked")
            .map_err(|e| StoreError::QueryFailed(format!("is_liked column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

        Ok(Preference {
            feed_id: row
                .try_get("feed_id")
                .map_err(|e| StoreError::QueryFailed(format!("feed_id column: {e}")))?,
            is_liked: is_liked != 0,
            reason: row.try_get::<Option<String>, _>("reason").ok().flatten(),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> Result<FeedSource, StoreError> {
        let get = |col: &str| -> Result<String, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };
        Ok(FeedSource {
            id: get("id")?,
            url: get("url")?,
            name: get("name")?,
            created_at: parse_timestamp(&get("created_at")?),
            updated_at: parse_timestamp(&get("updated_at")?),
        })
    }
}

/// Serialize an embedding vector to bytes.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl VectorIndex for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        for (entry, embedding) in entries.iter().zip(&embeddings) {
            sqlx::query(
                r#"
                INSERT INTO feed_items (id, document, title, link, pub_date, source, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.document)
            .bind(&entry.metadata.title)
            .bind(&entry.metadata.link)
            .bind(&entry.metadata.pub_date)
            .bind(&entry.metadata.source)
            .bind(embedding_to_blob(embedding))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("INSERT failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;
        debug!(count = entries.len(), "Indexed feed items");
        Ok(())
    }

    async fn query(&self, text: Option<&str>, n: usize) -> Result<Vec<IndexHit>, StoreError> {
        match text {
            Some(text) => {
                let query = self.embedder.embed_one(text).await?;
                let rows = sqlx::query("SELECT * FROM feed_items WHERE embedding IS NOT NULL")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StoreError::QueryFailed(format!("Vector scan: {e}")))?;
                let candidates = rows.iter().map(Self::row_to_hit).collect::<Result<Vec<_>, _>>()?;
                Ok(vector::nearest(candidates, &query, n))
            }
            None => {
                let rows = sqlx::query("SELECT * FROM feed_items ORDER BY iid LIMIT ?1")
                    .bind(n as i64)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StoreError::QueryFailed(format!("Unranked query: {e}")))?;
                rows.iter().map(Self::row_to_hit).collect()
            }
        }
    }

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<IndexHit>, StoreError> {
        let rows = match filter {
            None => {
                sqlx::query("SELECT * FROM feed_items ORDER BY iid")
                    .fetch_all(&self.pool)
                    .await
            }
            Some(MetadataFilter::Link(link)) => {
                sqlx::query("SELECT * FROM feed_items WHERE link = ?1 ORDER BY iid")
                    .bind(link)
                    .fetch_all(&self.pool)
                    .await
            }
            Some(MetadataFilter::TitleAndSource { title, source }) => {
                sqlx::query("SELECT * FROM feed_items WHERE title = ?1 AND source = ?2 ORDER BY iid")
                    .bind(title)
                    .bind(source)
                    .fetch_all(&self.pool)
                    .await
            }
            Some(MetadataFilter::Source(source)) => {
                sqlx::query("SELECT * FROM feed_items WHERE source = ?1 ORDER BY iid")
                    .bind(source)
                    .fetch_all(&self.pool)
                    .await
            }
            Some(MetadataFilter::Ids(ids)) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                let placeholders = (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
                let sql = format!("SELECT * FROM feed_items WHERE id IN ({placeholders}) ORDER BY iid");
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                query.fetch_all(&self.pool).await
            }
        }
        .map_err(|e| StoreError::QueryFailed(format!("Filtered get: {e}")))?;

        rows.iter().map(Self::row_to_hit).collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM feed_items")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT failed: {e}")))?;
        let n: i64 = row.try_get("n").unwrap_or(0);
        Ok(n as usize)
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM feed_items")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE failed: {e}")))?;
        info!("Feed collection cleared");
        Ok(())
    }
}

#[async_trait]
impl PreferenceDb for SqliteStore {
    async fn upsert_preference(&self, preference: Preference) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO preferences (feed_id, is_liked, reason, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(feed_id) DO UPDATE SET
                is_liked = excluded.is_liked,
                reason = excluded.reason,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&preference.feed_id)
        .bind(preference.is_liked as i64)
        .bind(&preference.reason)
        .bind(preference.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Preference upsert failed: {e}")))?;
        Ok(())
    }

    async fn find_preference(&self, feed_id: &str) -> Result<Option<Preference>, StoreError> {
        let row = sqlx::query("SELECT * FROM preferences WHERE feed_id = ?1")
            .bind(feed_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Preference lookup: {e}")))?;
        row.as_ref().map(Self::row_to_preference).transpose()
    }

    async fn find_preferences(&self) -> Result<Vec<Preference>, StoreError> {
        let rows = sqlx::query("SELECT * FROM preferences ORDER BY feed_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Preference scan: {e}")))?;
        rows.iter().map(Self::row_to_preference).collect()
    }

    async fn insert_source(&self, source: FeedSource) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO sources (id, url, name, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&source.id)
        .bind(&source.url)
        .bind(&source.name)
        .bind(source.created_at.to_rfc3339())
        .bind(source.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Source insert failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_sources(&self) -> Result<Vec<FeedSource>, StoreError> {
        let rows = sqlx::query("SELECT * FROM sources ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Source scan: {e}")))?;
        rows.iter().map(Self::row_to_source).collect()
    }

    async fn delete_source(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sources WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Source delete failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::TokenHashEmbedder;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:", Arc::new(TokenHashEmbedder::new(64)))
            .await
            .unwrap()
    }

    fn entry(id: &str, title: &str, link: &str) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            document: format!("{title}\nsummary of {title}"),
            metadata: ItemMetadata {
                title: title.into(),
                link: link.into(),
                pub_date: "2025-05-16 17:07:00".into(),
                source: "https://example.com/feed".into(),
            },
        }
    }

    #[tokio::test]
    async fn add_and_get_roundtrip() {
        let db = test_store().await;
        db.add(vec![entry("feed_1", "Rust release", "https://x/1")]).await.unwrap();

        let hits = db.get(None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry, entry("feed_1", "Rust release", "https://x/1"));
        assert_eq!(hits[0].embedding.as_ref().map(Vec::len), Some(64));
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn filters_by_link_title_source_and_ids() {
        let db = test_store().await;
        db.add(vec![
            entry("feed_1", "Rust release", "https://x/1"),
            entry("feed_2", "Go release", "https://x/2"),
        ])
        .await
        .unwrap();

        let by_link = db.get(Some(&MetadataFilter::Link("https://x/2".into()))).await.unwrap();
        assert_eq!(by_link[0].entry.id, "feed_2");

        let by_title = db
            .get(Some(&MetadataFilter::TitleAndSource {
                title: "Rust release".into(),
                source: "https://example.com/feed".into(),
            }))
            .await
            .unwrap();
        assert_eq!(by_title.len(), 1);

        let by_ids = db.get(Some(&MetadataFilter::Ids(vec!["feed_2".into(), "nope".into()]))).await.unwrap();
        assert_eq!(by_ids.len(), 1);

        let by_source = db.get(Some(&MetadataFilter::Source("https://example.com/feed".into()))).await.unwrap();
        assert_eq!(by_source.len(), 2);
    }

    #[tokio::test]
    async fn similarity_query_ranks_closest_first() {
        let db = test_store().await;
        db.add(vec![
            entry("feed_1", "gardening tomatoes", "https://x/1"),
            entry("feed_2", "rust compiler release", "https://x/2"),
        ])
        .await
        .unwrap();

        let hits = db.query(Some("rust compiler"), 2).await.unwrap();
        assert_eq!(hits[0].entry.id, "feed_2");
        assert!(hits[0].distance.unwrap() <= hits[1].distance.unwrap());
    }

    #[tokio::test]
    async fn delete_collection_keeps_preferences() {
        let db = test_store().await;
        db.add(vec![entry("feed_1", "a", "https://x/1")]).await.unwrap();
        db.upsert_preference(Preference::new("feed_1", true, None)).await.unwrap();

        db.delete_collection().await.unwrap();
        assert_eq!(db.count().await.unwrap(), 0);
        assert!(db.find_preference("feed_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn preference_upsert_on_conflict() {
        let db = test_store().await;
        db.upsert_preference(Preference::new("feed_1", false, Some("clickbait".into()))).await.unwrap();
        let pref = db.find_preference("feed_1").await.unwrap().unwrap();
        assert!(!pref.is_liked);
        assert_eq!(pref.reason.as_deref(), Some("clickbait"));

        db.upsert_preference(Preference::new("feed_1", true, None)).await.unwrap();
        let pref = db.find_preference("feed_1").await.unwrap().unwrap();
        assert!(pref.is_liked);
        assert!(pref.reason.is_none());
        assert_eq!(db.find_preferences().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sources_unique_by_url() {
        let db = test_store().await;
        let now = Utc::now();
        let source = FeedSource {
            id: "src_1".into(),
            url: "https://a/feed".into(),
            name: "A".into(),
            created_at: now,
            updated_at: now,
        };
        assert!(db.insert_source(source.clone()).await.unwrap());
        assert!(!db.insert_source(FeedSource { id: "src_2".into(), ..source }).await.unwrap());

        let listed = db.list_sources().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "src_1");

        assert!(db.delete_source("src_1").await.unwrap());
        assert!(db.list_sources().await.unwrap().is_empty());
    }
}
