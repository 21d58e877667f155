use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::exchanges::{Exchange, FetchAdapter, FundingTick};
use crate::store::{FundingRecord, Store};

pub const DEFAULT_BATCH_SIZE: usize = 50;
const MAX_WORKERS: usize = 10;

/// Outcome of one scraper pass over one exchange's catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeSummary {
    pub exchange: String,
    pub instruments: usize,
    pub rows_written: usize,
    pub batches_failed: usize,
    pub duration_ms: u64,
}

/// Drives one adapter across the whole instrument catalog: fixed-size batches,
/// a bounded fan-out per batch with a join barrier, one transactional write
/// per batch. A failed batch write is logged and skipped; the pass continues.
pub struct BatchScraper {
    adapter: Arc<dyn FetchAdapter>,
    store: Store,
    batch_size: usize,
}

impl BatchScraper {
    pub fn new(adapter: Arc<dyn FetchAdapter>, store: Store) -> Self {
        Self {
            adapter,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn exchange(&self) -> Exchange {
        self.adapter.exchange()
    }

    /// Scrape the `[since_ms, until_ms]` window (canonical ms) for every
    /// catalog instrument of this adapter's exchange.
    pub async fn run(&self, catalog: &Catalog, since_ms: i64, until_ms: i64) -> ScrapeSummary {
        let exchange = self.adapter.exchange();
        let unit = exchange.time_unit();
        let since = unit.from_canonical_ms(since_ms);
        let until = unit.from_canonical_ms(until_ms);

        let instruments = catalog.instruments(exchange);
        tracing::info!(
            "[{}] running scraper over {} instruments",
            exchange.name().to_uppercase(),
            instruments.len()
        );

        let started = Instant::now();
        let mut rows_written = 0usize;
        let mut batches_failed = 0usize;

        for batch in instruments.chunks(self.batch_size) {
            let workers = batch.len().min(MAX_WORKERS);

            // Fan out one fetch per instrument, at most `workers` in flight.
            // Each task owns its accumulator; `collect` is the join barrier,
            // so nothing is shared until the whole batch is done.
            let fetched: Vec<Vec<FundingTick>> = stream::iter(batch.iter().cloned())
                .map(|instrument| {
                    let adapter = Arc::clone(&self.adapter);
                    async move { adapter.fetch_history(&instrument, since, until).await }
                })
                .buffer_unordered(workers)
                .collect()
                .await;

            let records = normalize(exchange, fetched);
            if records.is_empty() {
                continue;
            }

            match self.store.insert_many(exchange, &records) {
                Ok(written) => {
                    rows_written += written;
                    metrics::counter!("fundwatch_rows_written_total", "exchange" => exchange.name())
                        .increment(written as u64);
                }
                Err(e) => {
                    batches_failed += 1;
                    tracing::error!(
                        "[{}] batch write failed ({} rows dropped): {e}",
                        exchange.name().to_uppercase(),
                        records.len()
                    );
                }
            }
            // Batch buffers drop here, before the next chunk starts.
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("fundwatch_scrape_duration_seconds", "exchange" => exchange.name())
            .record(duration_ms as f64 / 1000.0);
        tracing::info!(
            "[{}] scrape completed in {:.2}s, {rows_written} rows written",
            exchange.name().to_uppercase(),
            duration_ms as f64 / 1000.0
        );

        ScrapeSummary {
            exchange: exchange.name().to_string(),
            instruments: instruments.len(),
            rows_written,
            batches_failed,
            duration_ms,
        }
    }
}

/// Reduce raw ticks to the common record shape: suffix-stripped ticker,
/// native-unit timestamp, rate and mark price as fetched.
fn normalize(exchange: Exchange, fetched: Vec<Vec<FundingTick>>) -> Vec<FundingRecord> {
    fetched
        .into_iter()
        .flatten()
        .map(|tick| FundingRecord {
            instrument_name: exchange.ticker_of(&tick.instrument),
            timestamp: tick.timestamp,
            funding_rate: tick.rate,
            mark_price: tick.mark_price,
        })
        .collect()
}
