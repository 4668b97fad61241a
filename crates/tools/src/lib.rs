//! Tool backends for feedloom.
//!
//! Chat sessions reach tools through `feedloom_core::ToolBackend`: either a
//! remote MCP server over HTTP, or the local registry of built-in feed
//! tools when no server is configured.

pub mod feed_tools;
pub mod mcp;

use std::sync::Arc;
use std::time::Duration;

use feedloom_config::ToolsConfig;
use feedloom_core::tool::{ToolBackend, ToolRegistry};
use feedloom_recommend::Recommender;
use feedloom_store::FeedStore;
use tracing::info;

pub use feed_tools::{RecommendFeedsTool, SearchFeedsTool};
pub use mcp::McpHttpClient;

/// Registry with the built-in feed tools.
pub fn default_registry(store: Arc<FeedStore>, recommender: Arc<Recommender>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SearchFeedsTool::new(store)));
    registry.register(Box::new(RecommendFeedsTool::new(recommender)));
    registry
}

/// The MCP server named in config, or the local registry.
pub fn build_backend(
    config: &ToolsConfig,
    store: Arc<FeedStore>,
    recommender: Arc<Recommender>,
) -> Arc<dyn ToolBackend> {
    match config.mcp_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => {
            info!(url, "Using MCP tool server");
            Arc::new(McpHttpClient::new(url, Duration::from_secs(config.timeout_secs)))
        }
        None => {
            info!("No MCP server configured, using built-in tools");
            Arc::new(default_registry(store, recommender))
        }
    }
}
