use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;

use crate::exchanges::Exchange;
use crate::scraper::ScrapeSummary;

/// Last known scrape outcome for one exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeStatus {
    pub exchange: String,
    pub completed_at: String,
    pub rows_written: usize,
    pub instruments: usize,
    pub batches_failed: usize,
    pub duration_ms: u64,
}

/// Shared registry of per-exchange scrape outcomes. Written by the scheduler
/// after every pass, read by the status endpoint. Purely observational.
#[derive(Clone)]
pub struct StatusStore {
    inner: Arc<DashMap<Exchange, ScrapeStatus>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    pub fn record(&self, exchange: Exchange, summary: &ScrapeSummary) {
        self.inner.insert(
            exchange,
            ScrapeStatus {
                exchange: exchange.name().to_string(),
                completed_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                rows_written: summary.rows_written,
                instruments: summary.instruments,
                batches_failed: summary.batches_failed,
                duration_ms: summary.duration_ms,
            },
        );
    }

    /// Snapshot of all recorded statuses, ordered by exchange name.
    pub fn all(&self) -> Vec<ScrapeStatus> {
        let mut statuses: Vec<ScrapeStatus> =
            self.inner.iter().map(|r| r.value().clone()).collect();
        statuses.sort_by(|a, b| a.exchange.cmp(&b.exchange));
        statuses
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}
