//! Daily digest: the top recommended items rewritten by a model as HTML.

use std::fmt::Write as _;
use std::sync::Arc;

use feedloom_config::ChatConfig;
use feedloom_core::feed::RankedItem;
use feedloom_core::message::SessionId;
use feedloom_providers::ProviderRouter;
use feedloom_recommend::Recommender;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::prompt;
use crate::session::ChatSession;

const SUMMARY_CHARS: usize = 280;

#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub date: String,
    pub html: String,
    pub item_count: usize,
}

pub struct FeedDigester {
    recommender: Arc<Recommender>,
    router: Arc<ProviderRouter>,
    config: ChatConfig,
}

impl FeedDigester {
    pub fn new(recommender: Arc<Recommender>, router: Arc<ProviderRouter>, config: ChatConfig) -> Self {
        Self {
            recommender,
            router,
            config,
        }
    }

    /// Digest of the `limit` best items published on `date` (all dates when
    /// `None`). The heading is dated `date`, or today.
    pub async fn digest(&self, model_type: Option<&str>, limit: usize, date: Option<&str>) -> Result<Digest> {
        let items = self.recommender.recommend(limit, date, None).await?;
        let label = date
            .map(str::to_string)
            .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());

        if items.is_empty() {
            warn!(date = %label, "Nothing to digest");
            return Ok(Digest {
                html: format!("<p>No feed items for {label}.</p>"),
                date: label,
                item_count: 0,
            });
        }

        let model = self.router.resolve(model_type)?;
        let mut session = ChatSession::new(
            SessionId::new(),
            model_type.unwrap_or(self.router.default_model_type()),
            model,
            prompt::digest_system_prompt(&label),
        )
        .with_sampling(self.config.temperature, self.config.max_tokens);

        let reply = session.send(&listing(&items)).await?;
        info!(date = %label, items = items.len(), "Digest written");
        Ok(Digest {
            html: unfence(&reply),
            date: label,
            item_count: items.len(),
        })
    }
}

/// Compact numbered listing of items for the digest prompt.
fn listing(items: &[RankedItem]) -> String {
    let mut out = String::new();
    for (n, ranked) in items.iter().enumerate() {
        let item = &ranked.item;
        let _ = writeln!(out, "{}. {}", n + 1, item.title);
        let _ = writeln!(out, "   Link: {}", item.link);
        let _ = writeln!(out, "   Published: {}", item.published);
        let summary = item.summary.trim();
        if !summary.is_empty() {
            let short: String = summary.chars().take(SUMMARY_CHARS).collect();
            let _ = writeln!(out, "   Summary: {short}");
        }
    }
    out
}

/// Drop a surrounding ```html fence if the model added one.
fn unfence(reply: &str) -> String {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{Reply, ScriptedProvider};
    use feedloom_core::feed::NewFeedItem;
    use feedloom_store::{FeedStore, TokenHashEmbedder};

    async fn digester(provider: &Arc<ScriptedProvider>, titles: &[&str]) -> FeedDigester {
        let embedder = Arc::new(TokenHashEmbedder::new(32));
        let store = Arc::new(FeedStore::in_memory(embedder.clone()));
        for (i, title) in titles.iter().enumerate() {
            store
                .store_item(NewFeedItem {
                    title: title.to_string(),
                    link: format!("https://news.example/{i}"),
                    summary: "A".repeat(400),
                    published: "2025-05-16 09:00:00".into(),
                    source: "https://news.example/feed".into(),
                })
                .await
                .unwrap();
        }
        let mut router = ProviderRouter::new("scripted");
        router.register("scripted", provider.clone(), "scripted-model");
        FeedDigester::new(
            Arc::new(Recommender::new(store, embedder)),
            Arc::new(router),
            ChatConfig::default(),
        )
    }

    #[tokio::test]
    async fn digest_sends_listing_with_dated_prompt() {
        let provider = ScriptedProvider::new(vec![Reply::Text(vec!["```html\n<h1>2025-05-16</h1>\n```"])]);
        let digester = digester(&provider, &["Tokio 2.0", "Axum 1.0"]).await;

        let digest = digester.digest(None, 10, Some("2025-05-16")).await.unwrap();
        assert_eq!(digest.item_count, 2);
        assert_eq!(digest.html, "<h1>2025-05-16</h1>");

        let requests = provider.requests.lock().unwrap();
        assert!(requests[0].messages[0].content.contains("2025-05-16"));
        let listing = &requests[0].messages[1].content;
        assert!(listing.contains("Tokio 2.0"));
        assert!(listing.contains("https://news.example/1"));
        assert!(!listing.contains(&"A".repeat(SUMMARY_CHARS + 1)));
    }

    #[tokio::test]
    async fn empty_day_skips_the_model() {
        let provider = ScriptedProvider::new(vec![]);
        let digester = digester(&provider, &["Tokio 2.0"]).await;

        let digest = digester.digest(None, 10, Some("1999-01-01")).await.unwrap();
        assert_eq!(digest.item_count, 0);
        assert!(digest.html.contains("1999-01-01"));
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn unfence_keeps_plain_html() {
        assert_eq!(unfence("  <p>x</p> "), "<p>x</p>");
        assert_eq!(unfence("```\n<p>x</p>\n```"), "<p>x</p>");
    }
}
