mod aggregate;
mod api;
mod catalog;
mod config;
mod errors;
mod exchanges;
mod scheduler;
mod scraper;
mod status;
mod store;
mod timeframe;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use aggregate::Aggregator;
use api::{ApiServer, AppState};
use catalog::Catalog;
use config::Config;
use exchanges::aevo::Aevo;
use exchanges::bybit::Bybit;
use exchanges::gateio::Gateio;
use exchanges::hyperliquid::Hyperliquid;
use exchanges::FetchAdapter;
use scheduler::{Scheduler, SchedulerConfig};
use scraper::BatchScraper;
use status::StatusStore;
use store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    // ── 1. Static inputs and storage ───────────────────────────────
    let catalog = Arc::new(Catalog::load(&config.data_dir)?);
    let store = Store::open(&config.database_path, 8)?;
    let status = StatusStore::new();

    tracing::info!(
        "Fundwatch starting — {} tickers in catalog, db at {}",
        catalog.union_tickers().len(),
        config.database_path.display()
    );

    // ── 2. One scraper per exchange ────────────────────────────────
    let adapters: Vec<Arc<dyn FetchAdapter>> = vec![
        Arc::new(Aevo::new()),
        Arc::new(Bybit::new()),
        Arc::new(Gateio::new()),
        Arc::new(Hyperliquid::new()),
    ];
    let scrapers = adapters
        .into_iter()
        .map(|adapter| {
            Arc::new(
                BatchScraper::new(adapter, store.clone()).with_batch_size(config.batch_size),
            )
        })
        .collect();

    // ── 3. Scheduler loop in the background ────────────────────────
    let scheduler = Scheduler::new(
        scrapers,
        Arc::clone(&catalog),
        store.clone(),
        status.clone(),
        SchedulerConfig {
            bootstrap: config.bootstrap,
            interval: config.scrape_interval,
            cadence: config.cadence,
            mode: config.execution_mode,
            retention_days: config.retention_days,
        },
    );
    tokio::spawn(scheduler.run());

    // ── 4. API server in the foreground until Ctrl+C ───────────────
    let aggregator = Aggregator::new(store.clone(), Arc::clone(&catalog));
    let state = AppState {
        aggregator,
        store,
        catalog,
        status,
    };
    ApiServer::new(state, config.api_token.clone())
        .run(config.api_port)
        .await
}
