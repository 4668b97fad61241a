//! Bulk ingestion of already-parsed feed entries.

use feedloom_core::error::StoreError;
use feedloom_core::feed::NewFeedItem;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::feed_store::FeedStore;

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub ids: Vec<String>,
}

pub struct FeedIngestor {
    store: Arc<FeedStore>,
}

impl FeedIngestor {
    pub fn new(store: Arc<FeedStore>) -> Self {
        Self { store }
    }

    /// Store every entry from `source_url`. Duplicates are skipped and a
    /// failing entry is counted without stopping the rest. Entries with
    /// neither a title nor a link are skipped.
    pub async fn ingest(&self, source_url: &str, entries: Vec<NewFeedItem>) -> Result<IngestReport, StoreError> {
        let mut report = IngestReport::default();

        for mut entry in entries {
            if entry.title.trim().is_empty() && entry.link.trim().is_empty() {
                report.skipped += 1;
                continue;
            }
            if entry.source.is_empty() {
                entry.source = source_url.to_string();
            }

            match self.store.store_item(entry).await {
                Ok(Some(id)) => {
                    report.stored += 1;
                    report.ids.push(id);
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(source = source_url, error = %e, "Failed to store feed entry");
                    report.failed += 1;
                }
            }
        }

        if report.stored == 0 && report.failed > 0 {
            return Err(StoreError::Storage(format!(
                "all {} new entries from {source_url} failed to store",
                report.failed
            )));
        }

        info!(
            source = source_url,
            stored = report.stored,
            skipped = report.skipped,
            failed = report.failed,
            "Ingested feed"
        );
        Ok(report)
    }
}
