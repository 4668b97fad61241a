//! Feed storage for feedloom.
//!
//! `FeedStore` is the only entry point the rest of the workspace uses; the
//! vector index and preference database behind it are swappable (in-memory
//! for tests and ephemeral runs, SQLite for everything else).

pub mod dates;
pub mod vector;
pub mod hashing;
pub mod in_memory;
pub mod feed_store;
pub mod ingest;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use dates::normalize_date;
pub use vector::{cosine_distance, cosine_similarity, mean_vector};
pub use hashing::TokenHashEmbedder;
pub use in_memory::{InMemoryIndex, InMemoryPreferences};
pub use feed_store::FeedStore;
pub use ingest::{FeedIngestor, IngestReport};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
