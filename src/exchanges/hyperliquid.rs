use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Exchange, FetchAdapter, FundingTick, RetryPolicy, send_with_retry};

const INFO_URL: &str = "https://api.hyperliquid.xyz/info";
const PAGE_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
struct HyperliquidRow {
    #[serde(rename = "fundingRate")]
    funding_rate: String,

    time: i64,
}

pub struct Hyperliquid {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Hyperliquid {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::new(2, 1000, 10.0))
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
        }
    }
}

impl Default for Hyperliquid {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchAdapter for Hyperliquid {
    fn exchange(&self) -> Exchange {
        Exchange::Hyperliquid
    }

    /// The info endpoint returns oldest-first and caps each page at 500 rows,
    /// so pagination walks forward: `startTime` advances past the last
    /// timestamp seen. Timestamps are native milliseconds. Instruments are
    /// already bare coin symbols.
    async fn fetch_history(&self, instrument: &str, since: i64, until: i64) -> Vec<FundingTick> {
        let mut all = Vec::new();
        let mut current_start = since;

        while current_start < until {
            let body = json!({
                "type": "fundingHistory",
                "coin": instrument.to_uppercase(),
                "startTime": current_start,
                "endTime": until,
            });

            let response = send_with_retry(
                || self.client.post(INFO_URL).json(&body),
                &self.policy,
                "hyperliquid",
            );

            let page: Vec<HyperliquidRow> = match response.await {
                Ok(r) => match r.json().await {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("[HYPERLIQUID][{instrument}] malformed response: {e}");
                        return all;
                    }
                },
                Err(e) => {
                    tracing::warn!("[HYPERLIQUID][{instrument}] giving up on window: {e}");
                    return all;
                }
            };

            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            let mut latest = current_start;
            for row in page {
                latest = latest.max(row.time);
                all.push(FundingTick {
                    instrument: instrument.to_string(),
                    timestamp: row.time,
                    rate: row.funding_rate,
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
