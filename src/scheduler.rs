use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Timelike, Utc};

use crate::catalog::Catalog;
use crate::exchanges::Exchange;
use crate::scraper::BatchScraper;
use crate::status::StatusStore;
use crate::store::Store;
use crate::timeframe::Timeframe;

/// Run the four scrapers one after another, or all at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            other => Err(format!(
                "invalid execution mode '{other}', use 'sequential' or 'parallel'"
            )),
        }
    }
}

/// Steady-state cadence: a fixed number of seconds between passes, or once
/// per hour at a fixed minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    EverySeconds(u64),
    HourlyAt(u32),
}

impl Cadence {
    /// Time until the next scheduled pass, measured from now.
    fn until_next(self) -> Duration {
        match self {
            Cadence::EverySeconds(secs) => Duration::from_secs(secs),
            Cadence::HourlyAt(minute) => {
                let now = Utc::now();
                let elapsed = now.minute() * 60 + now.second();
                let target = minute * 60;
                let wait = if target > elapsed {
                    target - elapsed
                } else {
                    3600 - elapsed + target
                };
                Duration::from_secs(wait as u64)
            }
        }
    }
}

pub struct SchedulerConfig {
    /// Run the first pass over a one-year window to backfill history.
    pub bootstrap: bool,
    /// Window used for every steady-state pass.
    pub interval: Timeframe,
    pub cadence: Cadence,
    pub mode: ExecutionMode,
    /// Rows older than this are swept after each pass; 0 disables the sweep.
    pub retention_days: i64,
}

/// Runs all four exchange scrapers forever on the configured cadence. There
/// is no terminal failure state: a failing exchange is logged and its
/// siblings, and the loop, keep going.
pub struct Scheduler {
    scrapers: Vec<Arc<BatchScraper>>,
    catalog: Arc<Catalog>,
    store: Store,
    status: StatusStore,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        scrapers: Vec<Arc<BatchScraper>>,
        catalog: Arc<Catalog>,
        store: Store,
        status: StatusStore,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            scrapers,
            catalog,
            store,
            status,
            config,
        }
    }

    pub async fn run(self) {
        let first_interval = if self.config.bootstrap {
            Timeframe::OneYear
        } else {
            self.config.interval
        };
        tracing::info!("starting first scrape pass with interval: {first_interval}");
        self.run_all(first_interval).await;

        loop {
            let wait = self.config.cadence.until_next();
            tracing::info!("next scrape pass in {}s", wait.as_secs());
            tokio::time::sleep(wait).await;
            self.run_all(self.config.interval).await;
        }
    }

    async fn run_all(&self, interval: Timeframe) {
        let (since_ms, until_ms) = interval.resolve_window();

        match self.config.mode {
            ExecutionMode::Sequential => {
                for scraper in &self.scrapers {
                    run_one(
                        Arc::clone(scraper),
                        Arc::clone(&self.catalog),
                        self.status.clone(),
                        since_ms,
                        until_ms,
                    )
                    .await;
                }
            }
            ExecutionMode::Parallel => {
                // One task per exchange; a panic in one is contained to its
                // JoinError and never aborts the siblings or the loop.
                let handles: Vec<_> = self
                    .scrapers
                    .iter()
                    .map(|scraper| {
                        tokio::spawn(run_one(
                            Arc::clone(scraper),
                            Arc::clone(&self.catalog),
                            self.status.clone(),
                            since_ms,
                            until_ms,
                        ))
                    })
                    .collect();
                for handle in handles {
                    if let Err(e) = handle.await {
                        tracing::error!("scrape task aborted: {e}");
                    }
                }
            }
        }

        if self.config.retention_days > 0 {
            self.sweep_retention();
        }
    }

    fn sweep_retention(&self) {
        for exchange in Exchange::ALL {
            match self.store.delete_older_than(exchange, self.config.retention_days) {
                Ok(0) => {}
                Ok(swept) => {
                    tracing::info!("[{exchange}] retention sweep removed {swept} rows")
                }
                Err(e) => tracing::error!("[{exchange}] retention sweep failed: {e}"),
            }
        }
    }
}

async fn run_one(
    scraper: Arc<BatchScraper>,
    catalog: Arc<Catalog>,
    status: StatusStore,
    since_ms: i64,
    until_ms: i64,
) {
    let exchange = scraper.exchange();
    let summary = scraper.run(&catalog, since_ms, until_ms).await;
    if summary.batches_failed > 0 {
        tracing::error!(
            "[{}] pass finished with {} failed batches",
            exchange.name().to_uppercase(),
            summary.batches_failed
        );
    }
    status.record(exchange, &summary);
}
