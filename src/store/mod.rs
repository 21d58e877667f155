use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use rust_decimal::Decimal;

use crate::errors::StoreError;
use crate::exchanges::Exchange;

pub type DbPool = Pool<SqliteConnectionManager>;

/// The normalized shape every exchange's data is reduced to before it is
/// written: bare ticker, exchange-native timestamp, rate as text.
#[derive(Debug, Clone)]
pub struct FundingRecord {
    pub instrument_name: String,
    pub timestamp: i64,
    pub funding_rate: String,
    pub mark_price: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("invalid sort order '{other}', use 'asc' or 'desc'")),
        }
    }
}

/// Windowed per-ticker sums, or — when the window came back empty — the most
/// recent known rate per ticker. `fallback` lets callers tell stale data from
/// data inside the window; "no data ever" is an empty `rows` either way.
#[derive(Debug, Clone)]
pub struct WindowedFunding {
    pub rows: Vec<(String, Decimal)>,
    pub fallback: bool,
}

/// Storage gateway: one `funding_data_{exchange}` table per exchange behind a
/// SQLite connection pool. Owns the canonical-ms → native-unit conversion on
/// every windowed query path.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    pub fn open(path: &Path, max_size: u32) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(max_size).build(manager)?;
        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    /// Single-connection in-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        for exchange in Exchange::ALL {
            let table = exchange.table();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    instrument_name TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    funding_rate TEXT NOT NULL,
                    mark_price TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_name_ts
                    ON {table} (instrument_name, timestamp);"
            ))?;
        }
        Ok(())
    }

    /// Insert a batch of records in one transaction. Partial failure rolls the
    /// whole batch back — the scraper treats a batch as atomic.
    pub fn insert_many(
        &self,
        exchange: Exchange,
        records: &[FundingRecord],
    ) -> Result<usize, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (instrument_name, timestamp, funding_rate, mark_price)
                 VALUES (?1, ?2, ?3, ?4)",
                exchange.table()
            ))?;
            for record in records {
                stmt.execute(params![
                    record.instrument_name,
                    record.timestamp,
                    record.funding_rate,
                    record.mark_price,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    pub fn delete_all(&self, exchange: Exchange) -> Result<usize, StoreError> {
        let conn = self.pool.get()?;
        let deleted = conn.execute(&format!("DELETE FROM {}", exchange.table()), [])?;
        Ok(deleted)
    }

    /// Retention sweep: drop rows older than `age_days`. The cutoff is
    /// computed in canonical ms and converted to the exchange's native unit.
    pub fn delete_older_than(&self, exchange: Exchange, age_days: i64) -> Result<usize, StoreError> {
        let cutoff_ms = Utc::now().timestamp_millis() - age_days * 86_400_000;
        let cutoff = exchange.time_unit().from_canonical_ms(cutoff_ms);
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE timestamp < ?1", exchange.table()),
            params![cutoff],
        )?;
        Ok(deleted)
    }

    pub fn count(&self, exchange: Exchange) -> Result<i64, StoreError> {
        let conn = self.pool.get()?;
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", exchange.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn distinct_tickers(&self, exchange: Exchange) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT instrument_name FROM {} ORDER BY instrument_name",
            exchange.table()
        ))?;
        let tickers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tickers)
    }

    /// Sorted, deduplicated ticker union across all four exchange tables.
    pub fn union_distinct_tickers(&self) -> Result<Vec<String>, StoreError> {
        let mut all = Vec::new();
        for exchange in Exchange::ALL {
            all.extend(self.distinct_tickers(exchange)?);
        }
        all.sort();
        all.dedup();
        Ok(all)
    }

    /// Per-ticker sum of funding rates inside `[since_ms, until_ms]` (closed
    /// interval, canonical ms — converted to the exchange's native unit here).
    /// Summation is exact decimal arithmetic; rows whose stored rate fails to
    /// parse are logged and skipped rather than failing the query.
    pub fn accumulated_funding(
        &self,
        exchange: Exchange,
        since_ms: i64,
        until_ms: i64,
        keyword: Option<&str>,
    ) -> Result<Vec<(String, Decimal)>, StoreError> {
        let unit = exchange.time_unit();
        let since = unit.from_canonical_ms(since_ms);
        let until = unit.from_canonical_ms(until_ms);

        let conn = self.pool.get()?;
        let mut sums: BTreeMap<String, Decimal> = BTreeMap::new();

        let mut fold = |ticker: String, rate: String| {
            match Decimal::from_str(&rate) {
                Ok(value) => {
                    *sums.entry(ticker).or_default() += value;
                }
                Err(_) => {
                    tracing::warn!("[{exchange}] skipping malformed rate '{rate}' for {ticker}");
                }
            }
        };

        match keyword {
            Some(kw) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT instrument_name, funding_rate FROM {}
                     WHERE timestamp >= ?1 AND timestamp <= ?2 AND instrument_name = ?3",
                    exchange.table()
                ))?;
                let mut rows = stmt.query(params![since, until, kw.to_uppercase()])?;
                while let Some(row) = rows.next()? {
                    fold(row.get(0)?, row.get(1)?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT instrument_name, funding_rate FROM {}
                     WHERE timestamp >= ?1 AND timestamp <= ?2",
                    exchange.table()
                ))?;
                let mut rows = stmt.query(params![since, until])?;
                while let Some(row) = rows.next()? {
                    fold(row.get(0)?, row.get(1)?);
                }
            }
        }

        Ok(sums.into_iter().collect())
    }

    /// The most recent known rate per ticker, regardless of window.
    pub fn latest_funding(
        &self,
        exchange: Exchange,
        keyword: Option<&str>,
    ) -> Result<Vec<(String, Decimal)>, StoreError> {
        let conn = self.pool.get()?;
        // Bare funding_rate with MAX(timestamp) resolves to the row carrying
        // the max, per SQLite's bare-column-in-aggregate rule.
        let mut out = Vec::new();
        let mut push = |ticker: String, rate: String| match Decimal::from_str(&rate) {
            Ok(value) => out.push((ticker, value)),
            Err(_) => {
                tracing::warn!("[{exchange}] skipping malformed rate '{rate}' for {ticker}");
            }
        };

        match keyword {
            Some(kw) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT instrument_name, funding_rate, MAX(timestamp) FROM {}
                     WHERE instrument_name = ?1
                     GROUP BY instrument_name ORDER BY instrument_name",
                    exchange.table()
                ))?;
                let mut rows = stmt.query(params![kw.to_uppercase()])?;
                while let Some(row) = rows.next()? {
                    push(row.get(0)?, row.get(1)?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT instrument_name, funding_rate, MAX(timestamp) FROM {}
                     GROUP BY instrument_name ORDER BY instrument_name",
                    exchange.table()
                ))?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    push(row.get(0)?, row.get(1)?);
                }
            }
        }

        Ok(out)
    }

    /// Windowed per-ticker sums, ticker-sorted and paginated with
    /// `offset = (page - 1) * limit`. An empty window falls back to
    /// [`Store::latest_funding`] so callers get the most recent known rate
    /// instead of nothing — flagged so stale data is distinguishable.
    pub fn accumulated_funding_paginated(
        &self,
        exchange: Exchange,
        page: u32,
        limit: u32,
        since_ms: i64,
        until_ms: i64,
        sort_order: SortOrder,
        keyword: Option<&str>,
    ) -> Result<WindowedFunding, StoreError> {
        let windowed = self.accumulated_funding(exchange, since_ms, until_ms, keyword)?;

        let (mut rows, fallback) = if windowed.is_empty() {
            let latest = self.latest_funding(exchange, keyword)?;
            let any = !latest.is_empty();
            (latest, any)
        } else {
            (windowed, false)
        };

        if sort_order == SortOrder::Desc {
            rows.reverse();
        }

        let offset = page.saturating_sub(1) as usize * limit as usize;
        let rows = rows
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .collect();

        Ok(WindowedFunding { rows, fallback })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(name: &str, timestamp: i64, rate: &str) -> FundingRecord {
        FundingRecord {
            instrument_name: name.to_string(),
            timestamp,
            funding_rate: rate.to_string(),
            mark_price: None,
        }
    }

    #[test]
    fn insert_is_append_only_no_dedup() {
        let store = Store::open_in_memory().unwrap();
        let batch = vec![record("BTC", 1_000, "0.01"), record("ETH", 1_000, "0.02")];
        store.insert_many(Exchange::Bybit, &batch).unwrap();
        store.insert_many(Exchange::Bybit, &batch).unwrap();
        // Identical re-runs double the row count: duplicates are permitted by
        // design, there is no unique constraint.
        assert_eq!(store.count(Exchange::Bybit).unwrap(), 4);
    }

    #[test]
    fn accumulated_funding_sums_exact_decimals() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_many(
                Exchange::Bybit,
                &[
                    record("BTC", 1_000, "0.1"),
                    record("BTC", 2_000, "0.1"),
                    record("BTC", 3_000, "0.1"),
                ],
            )
            .unwrap();
        let sums = store
            .accumulated_funding(Exchange::Bybit, 0, 10_000, None)
            .unwrap();
        // 0.1 + 0.1 + 0.1 is exactly 0.3 — float summation would drift.
        assert_eq!(sums, vec![("BTC".to_string(), dec!(0.3))]);
    }

    #[test]
    fn window_is_closed_and_unit_converted() {
        let store = Store::open_in_memory().unwrap();
        // Gate.io stores native seconds; the query window arrives in ms.
        store
            .insert_many(
                Exchange::Gateio,
                &[
                    record("BTC", 999, "0.01"),
                    record("BTC", 1_000, "0.02"),
                    record("BTC", 2_000, "0.04"),
                    record("BTC", 2_001, "0.08"),
                ],
            )
            .unwrap();
        let sums = store
            .accumulated_funding(Exchange::Gateio, 1_000_000, 2_000_000, None)
            .unwrap();
        // Both boundary rows (native 1000 and 2000) included, neighbors not.
        assert_eq!(sums, vec![("BTC".to_string(), dec!(0.06))]);
    }

    #[test]
    fn aevo_window_converts_ms_to_micros() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_many(
                Exchange::Aevo,
                &[
                    record("BTC", 1_500_000, "0.01"),
                    record("BTC", 2_500_000, "0.02"),
                ],
            )
            .unwrap();
        let sums = store
            .accumulated_funding(Exchange::Aevo, 1_000, 2_000, None)
            .unwrap();
        assert_eq!(sums, vec![("BTC".to_string(), dec!(0.01))]);
    }

    #[test]
    fn keyword_filters_exact_ticker() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_many(
                Exchange::Bybit,
                &[record("BTC", 1_000, "0.01"), record("ETH", 1_000, "0.02")],
            )
            .unwrap();
        let sums = store
            .accumulated_funding(Exchange::Bybit, 0, 10_000, Some("btc"))
            .unwrap();
        assert_eq!(sums, vec![("BTC".to_string(), dec!(0.01))]);
    }

    #[test]
    fn malformed_rates_are_skipped_not_fatal() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_many(
                Exchange::Bybit,
                &[
                    record("BTC", 1_000, "0.01"),
                    record("BTC", 2_000, "not-a-rate"),
                ],
            )
            .unwrap();
        let sums = store
            .accumulated_funding(Exchange::Bybit, 0, 10_000, None)
            .unwrap();
        assert_eq!(sums, vec![("BTC".to_string(), dec!(0.01))]);
    }

    #[test]
    fn latest_funding_picks_most_recent_row() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_many(
                Exchange::Hyperliquid,
                &[
                    record("BTC", 1_000, "0.01"),
                    record("BTC", 3_000, "0.03"),
                    record("BTC", 2_000, "0.02"),
                ],
            )
            .unwrap();
        let latest = store.latest_funding(Exchange::Hyperliquid, None).unwrap();
        assert_eq!(latest, vec![("BTC".to_string(), dec!(0.03))]);
    }

    #[test]
    fn empty_window_falls_back_to_latest() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_many(Exchange::Bybit, &[record("BTC", 5_000, "0.07")])
            .unwrap();
        // Window far away from the only row.
        let result = store
            .accumulated_funding_paginated(
                Exchange::Bybit,
                1,
                10,
                1_000_000,
                2_000_000,
                SortOrder::Asc,
                None,
            )
            .unwrap();
        assert!(result.fallback);
        assert_eq!(result.rows, vec![("BTC".to_string(), dec!(0.07))]);

        // No data ever: empty rows, no fallback flag.
        let empty = store
            .accumulated_funding_paginated(
                Exchange::Gateio,
                1,
                10,
                1_000_000,
                2_000_000,
                SortOrder::Asc,
                None,
            )
            .unwrap();
        assert!(!empty.fallback);
        assert!(empty.rows.is_empty());
    }

    #[test]
    fn pagination_sorts_and_offsets() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_many(
                Exchange::Bybit,
                &[
                    record("ADA", 1_000, "0.01"),
                    record("BTC", 1_000, "0.02"),
                    record("ETH", 1_000, "0.03"),
                ],
            )
            .unwrap();
        let page2 = store
            .accumulated_funding_paginated(Exchange::Bybit, 2, 2, 0, 10_000, SortOrder::Asc, None)
            .unwrap();
        assert_eq!(page2.rows, vec![("ETH".to_string(), dec!(0.03))]);

        let desc = store
            .accumulated_funding_paginated(Exchange::Bybit, 1, 2, 0, 10_000, SortOrder::Desc, None)
            .unwrap();
        let tickers: Vec<&str> = desc.rows.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tickers, vec!["ETH", "BTC"]);
    }

    #[test]
    fn retention_and_wipe() {
        let store = Store::open_in_memory().unwrap();
        let now_ms = Utc::now().timestamp_millis();
        store
            .insert_many(
                Exchange::Bybit,
                &[
                    record("BTC", now_ms, "0.01"),
                    record("BTC", now_ms - 400 * 86_400_000, "0.02"),
                ],
            )
            .unwrap();
        let swept = store.delete_older_than(Exchange::Bybit, 366).unwrap();
        assert_eq!(swept, 1);
        assert_eq!(store.count(Exchange::Bybit).unwrap(), 1);
        store.delete_all(Exchange::Bybit).unwrap();
        assert_eq!(store.count(Exchange::Bybit).unwrap(), 0);
    }

    #[test]
    fn union_tickers_across_tables() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_many(Exchange::Aevo, &[record("BTC", 1, "0.01")])
            .unwrap();
        store
            .insert_many(Exchange::Bybit, &[record("ETH", 1, "0.01")])
            .unwrap();
        store
            .insert_many(Exchange::Gateio, &[record("BTC", 1, "0.01")])
            .unwrap();
        assert_eq!(store.union_distinct_tickers().unwrap(), vec!["BTC", "ETH"]);
    }
}
