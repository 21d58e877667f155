use async_trait::async_trait;
use serde::Deserialize;

use super::{Exchange, FetchAdapter, FundingTick, RetryPolicy, UserAgentPool, send_with_retry};

const FUNDING_HISTORY_URL: &str = "https://api.aevo.xyz/funding-history";
const PAGE_LIMIT: usize = 50;

/// The raw JSON shape Aevo sends back: rows are positional arrays of
/// `[instrument_name, timestamp, funding_rate, mark_price]`, all strings.
#[derive(Debug, Deserialize)]
struct FundingHistoryResponse {
    funding_history: Vec<AevoRow>,
}

#[derive(Debug, Deserialize)]
struct AevoRow(String, String, String, Option<String>);

pub struct Aevo {
    client: reqwest::Client,
    policy: RetryPolicy,
    user_agents: UserAgentPool,
}

impl Aevo {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::new(5, 1000, 1.5))
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
            user_agents: UserAgentPool::new(),
        }
    }
}

impl Default for Aevo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchAdapter for Aevo {
    fn exchange(&self) -> Exchange {
        Exchange::Aevo
    }

    /// Pages backward through the funding history: each page's end boundary
    /// moves to just before the earliest timestamp seen, until a short page
    /// signals exhaustion or the window is covered. Timestamps are native
    /// microseconds. The User-Agent rotates on every request.
    async fn fetch_history(&self, instrument: &str, since: i64, until: i64) -> Vec<FundingTick> {
        let mut all = Vec::new();
        let mut current_end = until;

        while current_end > since {
            let response = send_with_retry(
                || {
                    self.client
                        .get(FUNDING_HISTORY_URL)
                        .query(&[
                            ("instrument_name", instrument.to_string()),
                            ("start_time", since.to_string()),
                            ("end_time", current_end.to_string()),
                            ("limit", PAGE_LIMIT.to_string()),
                        ])
                        .header(reqwest::header::ACCEPT, "application/json")
                        .header(reqwest::header::USER_AGENT, self.user_agents.next())
                },
                &self.policy,
                "aevo",
            );

            let response = match response.await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("[AEVO][{instrument}] giving up on window: {e}");
                    return all;
                }
            };
            // Anything left over after the retry loop (4xx etc.) is permanent.
            let response = match response.error_for_status() {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("[AEVO][{instrument}] upstream rejected request: {e}");
                    return all;
                }
            };

            let page: FundingHistoryResponse = match response.json().await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("[AEVO][{instrument}] malformed response: {e}");
                    return all;
                }
            };

            if page.funding_history.is_empty() {
                break;
            }

            let page_len = page.funding_history.len();
            let mut earliest = current_end;
            for AevoRow(_, ts, rate, mark_price) in page.funding_history {
                let Ok(timestamp) = ts.parse::<i64>() else {
                    tracing::warn!("[AEVO][{instrument}] unparseable timestamp '{ts}'");
                    continue;
                };
                earliest = earliest.min(timestamp);
                all.push(FundingTick {
                    instrument: instrument.to_string(),
                    timestamp,
                    rate,
                    mark_price,
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
