use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::errors::StoreError;
use crate::exchanges::Exchange;
use crate::store::{SortOrder, Store};
use crate::timeframe::Timeframe;

/// One slot per exchange; `None` means that exchange has no data for the
/// ticker (neither inside the window nor via the latest-known fallback).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerExchangeFunding {
    pub aevo: Option<String>,
    pub bybit: Option<String>,
    pub gateio: Option<String>,
    pub hyperliquid: Option<String>,
}

impl PerExchangeFunding {
    fn set(&mut self, exchange: Exchange, value: String) {
        match exchange {
            Exchange::Aevo => self.aevo = Some(value),
            Exchange::Bybit => self.bybit = Some(value),
            Exchange::Gateio => self.gateio = Some(value),
            Exchange::Hyperliquid => self.hyperliquid = Some(value),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoinFunding {
    pub coin: String,
    pub logo: String,
    pub name: String,
    pub funding: PerExchangeFunding,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMeta {
    pub date: String,
    pub time: String,
    pub coin: Option<String>,
    pub sort_order: String,
    pub page: u32,
    pub per_page: u32,
    pub total_items: usize,
    pub total_pages: usize,
    pub is_next_page: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateResponse {
    pub data: Vec<CoinFunding>,
    pub meta: AggregateMeta,
}

/// How many per-ticker sums to pull from each exchange before re-paginating
/// the merged view — large enough to cover any sane page request.
const PER_EXCHANGE_FETCH: u32 = 100;

/// Builds the cross-exchange funding view: one row per canonical ticker, one
/// column per exchange, recomputed from the store on every call (no cache).
pub struct Aggregator {
    store: Store,
    catalog: Arc<Catalog>,
}

impl Aggregator {
    pub fn new(store: Store, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }

    pub fn aggregate(
        &self,
        time: Timeframe,
        page: u32,
        limit: u32,
        sort_order: SortOrder,
        keyword: Option<&str>,
    ) -> Result<AggregateResponse, StoreError> {
        let (since_ms, until_ms) = time.resolve_window();
        self.aggregate_window(time, since_ms, until_ms, page, limit, sort_order, keyword)
    }

    /// Same as [`Aggregator::aggregate`] with an explicit window, so the
    /// window can be pinned deterministically.
    pub fn aggregate_window(
        &self,
        time: Timeframe,
        since_ms: i64,
        until_ms: i64,
        page: u32,
        limit: u32,
        sort_order: SortOrder,
        keyword: Option<&str>,
    ) -> Result<AggregateResponse, StoreError> {
        let page = page.max(1);
        let limit = limit.max(1);

        // Canonical ticker set: the catalog union, or the single exact
        // (case-insensitive) keyword match. An unmatched keyword yields an
        // empty view rather than an error.
        let union = self.catalog.union_tickers();
        let tickers: Vec<String> = match keyword {
            Some(kw) => union
                .into_iter()
                .filter(|t| t.eq_ignore_ascii_case(kw))
                .collect(),
            None => union,
        };

        // Left-join merge seeded from the canonical set: every ticker gets a
        // row, even if no exchange has data for it.
        let mut merged: BTreeMap<String, PerExchangeFunding> = tickers
            .iter()
            .map(|t| (t.clone(), PerExchangeFunding::default()))
            .collect();

        for exchange in Exchange::ALL {
            let windowed = match self.store.accumulated_funding_paginated(
                exchange,
                1,
                PER_EXCHANGE_FETCH,
                since_ms,
                until_ms,
                SortOrder::Asc,
                keyword,
            ) {
                Ok(w) => w,
                Err(e) => {
                    // One exchange's read failure nulls its column, it must
                    // not take the whole response down.
                    tracing::error!("[{exchange}] aggregate read failed: {e}");
                    continue;
                }
            };
            if windowed.fallback {
                tracing::debug!("[{exchange}] serving latest-known rates (window was empty)");
            }
            for (ticker, sum) in windowed.rows {
                if let Some(slot) = merged.get_mut(&ticker) {
                    slot.set(exchange, sum.to_string());
                }
            }
        }

        let total_items = merged.len();
        let total_pages = total_items.div_ceil(limit as usize);
        let is_next_page = (page as usize) < total_pages;

        let mut ordered: Vec<(String, PerExchangeFunding)> = merged.into_iter().collect();
        if sort_order == SortOrder::Desc {
            ordered.reverse();
        }

        let offset = (page - 1) as usize * limit as usize;
        let data = ordered
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .map(|(ticker, funding)| {
                let (logo, name) = self.catalog.display_info(&ticker);
                CoinFunding {
                    coin: ticker,
                    logo,
                    name,
                    funding,
                }
            })
            .collect();

        Ok(AggregateResponse {
            data,
            meta: AggregateMeta {
                date: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                time: time.as_str().to_string(),
                coin: keyword.map(str::to_string),
                sort_order: sort_order.as_str().to_string(),
                page,
                per_page: limit,
                total_items,
                total_pages,
                is_next_page,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::store::FundingRecord;

    fn record(name: &str, timestamp: i64, rate: &str) -> FundingRecord {
        FundingRecord {
            instrument_name: name.to_string(),
            timestamp,
            funding_rate: rate.to_string(),
            mark_price: None,
        }
    }

    fn catalog(bybit: &[&str], hyperliquid: &[&str]) -> Arc<Catalog> {
        let mut instruments = HashMap::new();
        instruments.insert(
            Exchange::Bybit,
            bybit.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        );
        instruments.insert(
            Exchange::Hyperliquid,
            hyperliquid.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        );
        Arc::new(Catalog::from_parts(
            instruments,
            HashMap::from([("BTC".to_string(), "Bitcoin".to_string())]),
        ))
    }

    #[test]
    fn two_exchange_scenario_merges_and_paginates() {
        let store = Store::open_in_memory().unwrap();
        let (t1, t2, t3) = (1_000_000, 2_000_000, 3_000_000);
        store
            .insert_many(
                Exchange::Bybit,
                &[record("BTC", t1, "0.01"), record("BTC", t2, "0.02")],
            )
            .unwrap();
        store
            .insert_many(Exchange::Hyperliquid, &[record("ETH", t3, "0.05")])
            .unwrap();

        let aggregator = Aggregator::new(
            store,
            catalog(&["BTC/USDT:USDT", "ETH/USDT:USDT"], &["BTC", "ETH"]),
        );
        let response = aggregator
            .aggregate_window(Timeframe::OneDay, t1, t3, 1, 10, SortOrder::Asc, None)
            .unwrap();

        assert_eq!(response.meta.total_items, 2);
        assert_eq!(response.meta.total_pages, 1);
        assert!(!response.meta.is_next_page);

        let btc = &response.data[0];
        assert_eq!(btc.coin, "BTC");
        assert_eq!(btc.funding.bybit.as_deref(), Some("0.03"));
        assert_eq!(btc.funding.hyperliquid, None);
        assert_eq!(btc.funding.aevo, None);

        let eth = &response.data[1];
        assert_eq!(eth.coin, "ETH");
        assert_eq!(eth.funding.bybit, None);
        assert_eq!(eth.funding.hyperliquid.as_deref(), Some("0.05"));
    }

    #[test]
    fn every_union_ticker_appears_even_all_null() {
        let store = Store::open_in_memory().unwrap();
        let aggregator = Aggregator::new(store, catalog(&["BTC/USDT:USDT"], &["ETH", "SOL"]));
        let response = aggregator
            .aggregate_window(Timeframe::OneHour, 0, 1_000, 1, 10, SortOrder::Asc, None)
            .unwrap();
        // Nothing stored at all — the canonical set is still emitted.
        let coins: Vec<&str> = response.data.iter().map(|c| c.coin.as_str()).collect();
        assert_eq!(coins, vec!["BTC", "ETH", "SOL"]);
        assert!(
            response
                .data
                .iter()
                .all(|c| c.funding == PerExchangeFunding::default())
        );
        assert_eq!(response.meta.total_items, 3);
    }

    #[test]
    fn pages_concatenate_to_the_full_sorted_set() {
        let store = Store::open_in_memory().unwrap();
        let tickers = ["ADA", "BTC", "DOGE", "ETH", "SOL"];
        let instruments: Vec<String> = tickers.iter().map(|t| t.to_string()).collect();
        let mut map = HashMap::new();
        map.insert(Exchange::Hyperliquid, instruments);
        let aggregator = Aggregator::new(
            store,
            Arc::new(Catalog::from_parts(map, HashMap::new())),
        );

        let limit = 2;
        let first = aggregator
            .aggregate_window(Timeframe::OneHour, 0, 1_000, 1, limit, SortOrder::Asc, None)
            .unwrap();
        assert_eq!(first.meta.total_pages, 3); // ceil(5 / 2)
        assert!(first.meta.is_next_page);

        let mut seen = Vec::new();
        for page in 1..=first.meta.total_pages as u32 {
            let response = aggregator
                .aggregate_window(Timeframe::OneHour, 0, 1_000, page, limit, SortOrder::Asc, None)
                .unwrap();
            seen.extend(response.data.into_iter().map(|c| c.coin));
        }
        assert_eq!(seen, tickers);
    }

    #[test]
    fn keyword_narrows_to_exact_case_insensitive_match() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_many(Exchange::Bybit, &[record("BTC", 1_000, "0.01")])
            .unwrap();
        let aggregator = Aggregator::new(store, catalog(&["BTC/USDT:USDT", "ETH/USDT:USDT"], &[]));

        let response = aggregator
            .aggregate_window(Timeframe::OneDay, 0, 10_000, 1, 10, SortOrder::Asc, Some("btc"))
            .unwrap();
        assert_eq!(response.meta.total_items, 1);
        assert_eq!(response.data[0].coin, "BTC");
        assert_eq!(response.data[0].name, "Bitcoin");

        let miss = aggregator
            .aggregate_window(Timeframe::OneDay, 0, 10_000, 1, 10, SortOrder::Asc, Some("BT"))
            .unwrap();
        assert!(miss.data.is_empty());
        assert_eq!(miss.meta.total_items, 0);
    }

    #[test]
    fn descending_sort_reverses_the_page_order() {
        let store = Store::open_in_memory().unwrap();
        let aggregator = Aggregator::new(store, catalog(&[], &["BTC", "ETH", "SOL"]));
        let response = aggregator
            .aggregate_window(Timeframe::OneHour, 0, 1_000, 1, 10, SortOrder::Desc, None)
            .unwrap();
        let coins: Vec<&str> = response.data.iter().map(|c| c.coin.as_str()).collect();
        assert_eq!(coins, vec!["SOL", "ETH", "BTC"]);
    }

    #[test]
    fn stale_rates_fill_in_when_window_is_empty() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_many(Exchange::Bybit, &[record("BTC", 5_000, "0.07")])
            .unwrap();
        let aggregator = Aggregator::new(store, catalog(&["BTC/USDT:USDT"], &[]));
        // Window nowhere near the stored row: the latest known rate shows up
        // instead of a null.
        let response = aggregator
            .aggregate_window(
                Timeframe::OneHour,
                1_000_000,
                2_000_000,
                1,
                10,
                SortOrder::Asc,
                None,
            )
            .unwrap();
        assert_eq!(response.data[0].funding.bybit.as_deref(), Some("0.07"));
    }
}
