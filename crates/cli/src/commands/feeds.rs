//! `feedloom ingest`, `feedloom recommend` and `feedloom like`.

use std::path::Path;

use feedloom_core::feed::{NewFeedItem, RankedItem};

pub async fn ingest(source: &str, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let entries: Vec<NewFeedItem> =
        serde_json::from_str(&raw).map_err(|e| format!("{} is not a JSON array of entries: {e}", file.display()))?;

    let state = super::load_state().await?;
    let report = state.ingestor.ingest(source, entries).await?;

    println!("📥 Ingested {source}");
    println!("   Stored:   {}", report.stored);
    println!("   Skipped:  {}", report.skipped);
    if report.failed > 0 {
        println!("   ⚠️  Failed: {}", report.failed);
    }
    Ok(())
}

pub async fn recommend(
    limit: Option<usize>,
    date: Option<String>,
    source: Option<String>,
    refresh: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::load_state().await?;

    if refresh {
        let status = state.recommender.refresh().await?;
        eprintln!("  {}", status.message);
    }

    let limit = limit.unwrap_or(state.config.recommendation.default_limit);
    let items = state
        .recommender
        .recommend(limit, date.as_deref(), source.as_deref())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("  No feed items found. Run `feedloom ingest` first.");
        return Ok(());
    }
    for line in table(&items) {
        println!("{line}");
    }
    Ok(())
}

pub async fn like(feed_id: &str, is_liked: bool, reason: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::load_state().await?;
    let preference = state.store.store_preference(feed_id, is_liked, reason).await?;

    let verdict = if preference.is_liked { "👍 Liked" } else { "👎 Disliked" };
    match &preference.reason {
        Some(reason) => println!("{verdict} {feed_id} ({reason})"),
        None => println!("{verdict} {feed_id}"),
    }
    Ok(())
}

/// One line per item: score, mark, date, title and link.
fn table(items: &[RankedItem]) -> Vec<String> {
    items
        .iter()
        .map(|ranked| {
            let mark = match &ranked.preference {
                Some(p) if p.is_liked => "👍",
                Some(_) => "👎",
                None => "  ",
            };
            format!(
                "{:>3} {mark} {}  {}\n        {}",
                ranked.preference_order.unwrap_or(50),
                ranked.item.published_date(),
                ranked.item.title,
                ranked.item.link
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedloom_core::feed::{FeedItem, Preference};

    fn ranked(title: &str, liked: Option<bool>, score: f32) -> RankedItem {
        let mut r = RankedItem::new(FeedItem {
            id: title.to_lowercase(),
            title: title.into(),
            link: format!("https://x/{title}"),
            summary: String::new(),
            source: "https://x/feed".into(),
            published: "2025-05-16 08:00:00".into(),
            embedding: None,
        });
        r.preference = liked.map(|l| Preference::new(r.item.id.clone(), l, None));
        r.set_score(score);
        r
    }

    #[test]
    fn table_shows_order_mark_and_date() {
        let lines = table(&[ranked("Tokio", Some(true), 0.0), ranked("Cooking", None, 0.42)]);
        assert!(lines[0].starts_with("  0 👍 2025-05-16  Tokio"));
        assert!(lines[1].starts_with(" 42    2025-05-16  Cooking"));
        assert!(lines[1].ends_with("https://x/Cooking"));
    }
}
