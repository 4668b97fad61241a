//! Built-in tools over the local feed store and recommender.

use async_trait::async_trait;
use feedloom_core::error::ToolError;
use feedloom_core::feed::RankedItem;
use feedloom_core::tool::{Tool, ToolResult};
use feedloom_recommend::Recommender;
use feedloom_store::FeedStore;
use serde::Serialize;
use std::sync::Arc;

const MAX_RESULTS: u64 = 50;

/// Compact view of a ranked item for tool output.
#[derive(Debug, Serialize)]
struct Listing<'a> {
    id: &'a str,
    title: &'a str,
    link: &'a str,
    published: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    liked: Option<bool>,
}

fn render(items: &[RankedItem], empty: &str) -> ToolResult {
    if items.is_empty() {
        return ToolResult::ok(empty);
    }
    let listings: Vec<Listing<'_>> = items
        .iter()
        .map(|r| Listing {
            id: &r.item.id,
            title: &r.item.title,
            link: &r.item.link,
            published: &r.item.published,
            score: r.preference_score,
            liked: r.preference.as_ref().map(|p| p.is_liked),
        })
        .collect();
    ToolResult::ok(serde_json::to_string_pretty(&listings).unwrap_or_default())
}

fn bounded(arguments: &serde_json::Value, key: &str, default: u64) -> usize {
    arguments[key].as_u64().unwrap_or(default).clamp(1, MAX_RESULTS) as usize
}

pub struct SearchFeedsTool {
    store: Arc<FeedStore>,
}

impl SearchFeedsTool {
    pub fn new(store: Arc<FeedStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SearchFeedsTool {
    fn name(&self) -> &str {
        "search_feeds"
    }

    fn description(&self) -> &str {
        "Search stored RSS items by meaning. Parameters: query (string, required), n (integer, default 5)."
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let n = bounded(&arguments, "n", 5);

        let items = self.store.search(query, n).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;
        Ok(render(&items, &format!("No feed items match '{query}'.")))
    }
}

pub struct RecommendFeedsTool {
    recommender: Arc<Recommender>,
}

impl RecommendFeedsTool {
    pub fn new(recommender: Arc<Recommender>) -> Self {
        Self { recommender }
    }
}

#[async_trait]
impl Tool for RecommendFeedsTool {
    fn name(&self) -> &str {
        "recommend_feeds"
    }

    fn description(&self) -> &str {
        "List RSS items ranked by the user's preferences. Parameters: limit (integer, default 10), \
         date (YYYY-MM-DD, optional), source (feed URL, optional)."
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let limit = bounded(&arguments, "limit", 10);
        let date = arguments["date"].as_str().filter(|d| !d.trim().is_empty());
        let source = arguments["source"].as_str().filter(|s| !s.trim().is_empty());

        let items = self
            .recommender
            .recommend(limit, date, source)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        Ok(render(&items, "No feed items to recommend."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedloom_core::feed::NewFeedItem;
    use feedloom_store::TokenHashEmbedder;
    use serde_json::json;

    async fn seeded() -> (Arc<FeedStore>, Arc<Recommender>) {
        let embedder = Arc::new(TokenHashEmbedder::new(64));
        let store = Arc::new(FeedStore::in_memory(embedder.clone()));
        for (title, link) in [
            ("Rust async runtimes compared", "https://x/rust"),
            ("Gardening in spring", "https://x/garden"),
        ] {
            store
                .store_item(NewFeedItem {
                    title: title.into(),
                    link: link.into(),
                    summary: String::new(),
                    published: "2025-05-16 08:00:00".into(),
                    source: "https://x/feed".into(),
                })
                .await
                .unwrap();
        }
        let recommender = Arc::new(Recommender::new(store.clone(), embedder));
        (store, recommender)
    }

    #[tokio::test]
    async fn search_returns_closest_first() {
        let (store, _) = seeded().await;
        let tool = SearchFeedsTool::new(store);
        let result = tool.execute(json!({"query": "rust async", "n": 1})).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("Rust async runtimes compared"));
        assert!(!result.output.contains("Gardening"));
    }

    #[tokio::test]
    async fn search_requires_query() {
        let (store, _) = seeded().await;
        let tool = SearchFeedsTool::new(store);
        let err = tool.execute(json!({"query": "  "})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn recommend_lists_items() {
        let (_, recommender) = seeded().await;
        let tool = RecommendFeedsTool::new(recommender);
        let result = tool.execute(json!({"limit": 5})).await.unwrap();
        assert!(result.output.contains("https://x/rust"));
        assert!(result.output.contains("https://x/garden"));
        let listed: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn recommend_with_no_matching_date_is_empty() {
        let (_, recommender) = seeded().await;
        let tool = RecommendFeedsTool::new(recommender);
        let result = tool.execute(json!({"date": "1999-01-01"})).await.unwrap();
        assert_eq!(result.output, "No feed items to recommend.");
    }
}
