use async_trait::async_trait;
use serde::Deserialize;

use super::{Exchange, FetchAdapter, FundingTick, RetryPolicy, send_with_retry};

const FUNDING_RATE_URL: &str = "https://api.gateio.ws/api/v4/futures/usdt/funding_rate";
const PAGE_LIMIT: usize = 1000;

/// One settlement record: `t` is the settlement time in native seconds,
/// `r` the funding rate.
#[derive(Debug, Deserialize)]
struct GateRow {
    t: i64,
    r: String,
}

pub struct Gateio {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Gateio {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::new(2, 1000, 2.0))
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
        }
    }

    /// "BTC/USDT:USDT" → "BTC_USDT" (the v4 futures contract format).
    fn contract(instrument: &str) -> String {
        match instrument.split_once('/') {
            Some((base, rest)) => {
                let quote = rest.split(':').next().unwrap_or(rest);
                format!("{base}_{quote}")
            }
            None => instrument.to_string(),
        }
    }
}

impl Default for Gateio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchAdapter for Gateio {
    fn exchange(&self) -> Exchange {
        Exchange::Gateio
    }

    /// Pages forward: `from` advances past the latest settlement seen until a
    /// short page signals exhaustion. Timestamps are native seconds.
    async fn fetch_history(&self, instrument: &str, since: i64, until: i64) -> Vec<FundingTick> {
        let contract = Self::contract(instrument);
        let mut all = Vec::new();
        let mut current_start = since;

        while current_start < until {
            let response = send_with_retry(
                || {
                    self.client.get(FUNDING_RATE_URL).query(&[
                        ("contract", contract.clone()),
                        ("from", current_start.to_string()),
                        ("to", until.to_string()),
                        ("limit", PAGE_LIMIT.to_string()),
                    ])
                },
                &self.policy,
                "gateio",
            );

            let response = match response.await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("[GATE][{contract}] giving up on window: {e}");
                    return all;
                }
            };
            let response = match response.error_for_status() {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("[GATE][{contract}] upstream rejected request: {e}");
                    return all;
                }
            };

            let page: Vec<GateRow> = match response.json().await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("[GATE][{contract}] malformed response: {e}");
                    return all;
                }
            };

            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            let mut latest = current_start;
            for row in page {
                latest = latest.max(row.t);
                all.push(FundingTick {
                    instrument: instrument.to_string(),
                    timestamp: row.t,
                    rate: row.r,
                    mark_price: None,
                });
            }

            if page_len < PAGE_LIMIT {
                break;
            }
            current_start = latest + 1;
        }

        all
    }
}
