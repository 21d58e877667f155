use async_trait::async_trait;
use serde::Deserialize;

use super::{Exchange, FetchAdapter, FundingTick, RetryPolicy, send_with_retry};
use crate::errors::ExchangeError;

const FUNDING_HISTORY_URL: &str = "https://api.bybit.com/v5/market/funding/history";
const PAGE_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
struct BybitResponse {
    #[serde(rename = "retCode")]
    ret_code: i32,
    result: BybitResult,
}

#[derive(Debug, Deserialize)]
struct BybitResult {
    #[serde(default)]
    list: Vec<BybitRow>,
}

#[derive(Debug, Deserialize)]
struct BybitRow {
    #[serde(rename = "fundingRate")]
    funding_rate: String,

    #[serde(rename = "fundingRateTimestamp")]
    funding_rate_timestamp: String,
}

pub struct Bybit {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Bybit {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::new(3, 1000, 2.0))
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
        }
    }

    /// "BTC/USDT:USDT" → "BTCUSDT" (the v5 API's linear-contract format).
    fn native_symbol(instrument: &str) -> String {
        match instrument.split_once('/') {
            Some((base, rest)) => {
                let quote = rest.split(':').next().unwrap_or(rest);
                format!("{base}{quote}")
            }
            None => instrument.to_string(),
        }
    }
}

impl Default for Bybit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchAdapter for Bybit {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    /// The v5 endpoint returns newest-first, so pagination walks backward:
    /// `endTime` moves to just before the earliest timestamp of the last page.
    /// Timestamps are native milliseconds.
    async fn fetch_history(&self, instrument: &str, since: i64, until: i64) -> Vec<FundingTick> {
        let symbol = Self::native_symbol(instrument);
        let mut all = Vec::new();
        let mut current_end = until;

        while current_end > since {
            let response = send_with_retry(
                || {
                    self.client.get(FUNDING_HISTORY_URL).query(&[
                        ("category", "linear".to_string()),
                        ("symbol", symbol.clone()),
                        ("startTime", since.to_string()),
                        ("endTime", current_end.to_string()),
                        ("limit", PAGE_LIMIT.to_string()),
                    ])
                },
                &self.policy,
                "bybit",
            );

            let page: BybitResponse = match response.await {
                Ok(r) => match r.json().await {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("[BYBIT][{symbol}] malformed response: {e}");
                        return all;
                    }
                },
                Err(e) => {
                    tracing::warn!("[BYBIT][{symbol}] giving up on window: {e}");
                    return all;
                }
            };

            // Bybit signals errors via retCode, not just HTTP status. A
            // non-zero code (bad symbol etc.) is permanent — no retry.
            if page.ret_code != 0 {
                let err = ExchangeError::UnexpectedData(format!("Bybit retCode: {}", page.ret_code));
                tracing::warn!("[BYBIT][{symbol}] {err}");
                return all;
            }

            if page.result.list.is_empty() {
                break;
            }

            let page_len = page.result.list.len();
            let mut earliest = current_end;
            for row in page.result.list {
                let Ok(timestamp) = row.funding_rate_timestamp.parse::<i64>() else {
                    tracing::warn!(
                        "[BYBIT][{symbol}] unparseable timestamp '{}'",
                        row.funding_rate_timestamp
                    );
                    continue;
                };
                earliest = earliest.min(timestamp);
                all.push(FundingTick {
                    instrument: instrument.to_string(),
                    timestamp,
                    rate: row.funding_rate,
                    mark_price: None,
                });
            }

            if page_len < PAGE_LIMIT {
                break;
            }
            current_end = earliest - 1;
        }

        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_symbol_formats() {
        assert_eq!(Bybit::native_symbol("BTC/USDT:USDT"), "BTCUSDT");
        assert_eq!(Bybit::native_symbol("SOL/USDC:USDC"), "SOLUSDC");
        assert_eq!(Bybit::native_symbol("BTCUSDT"), "BTCUSDT");
    }
}
