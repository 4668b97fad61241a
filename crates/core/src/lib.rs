//! # Feedloom Core
//!
//! Domain types, capability traits, and error definitions shared by every
//! feedloom crate. Nothing here talks to the network or a database; the
//! collaborators (model backends, embedders, vector index, preference
//! database, tool backends) are traits implemented in their own crates.

pub mod error;
pub mod message;
pub mod provider;
pub mod embedding;
pub mod feed;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError, ToolError};
pub use message::{Message, Role, SessionId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use embedding::Embedder;
pub use feed::{FeedItem, FeedSource, NewFeedItem, Preference, RankedItem};
pub use store::{IndexEntry, IndexHit, ItemMetadata, MetadataFilter, PreferenceDb, VectorIndex};
pub use tool::{Tool, ToolBackend, ToolRegistry, ToolResult, ToolStream};
