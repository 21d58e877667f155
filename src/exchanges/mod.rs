use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::errors::ExchangeError;
use crate::timeframe::TimeUnit;

pub mod aevo;
pub mod bybit;
pub mod gateio;
pub mod hyperliquid;

/// The four upstream venues. Everything keyed per exchange — table names,
/// timestamp units, ticker suffixes — lives on this enum so no query path can
/// drift out of sync with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Aevo,
    Bybit,
    Gateio,
    Hyperliquid,
}

impl Exchange {
    pub const ALL: [Exchange; 4] = [
        Exchange::Aevo,
        Exchange::Bybit,
        Exchange::Gateio,
        Exchange::Hyperliquid,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Exchange::Aevo => "aevo",
            Exchange::Bybit => "bybit",
            Exchange::Gateio => "gateio",
            Exchange::Hyperliquid => "hyperliquid",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Exchange::Aevo => "funding_data_aevo",
            Exchange::Bybit => "funding_data_bybit",
            Exchange::Gateio => "funding_data_gateio",
            Exchange::Hyperliquid => "funding_data_hyperliquid",
        }
    }

    /// Native unit of the `timestamp` column in this exchange's table.
    pub fn time_unit(self) -> TimeUnit {
        match self {
            Exchange::Aevo => TimeUnit::Micros,
            Exchange::Bybit => TimeUnit::Millis,
            Exchange::Gateio => TimeUnit::Seconds,
            Exchange::Hyperliquid => TimeUnit::Millis,
        }
    }

    /// Strip the exchange-specific suffix off an instrument name, leaving the
    /// bare coin symbol ("BTC-PERP" → "BTC", "ETH/USDT:USDT" → "ETH").
    pub fn ticker_of(self, instrument: &str) -> String {
        match self {
            Exchange::Aevo => instrument
                .strip_suffix("-PERP")
                .unwrap_or(instrument)
                .to_string(),
            Exchange::Bybit | Exchange::Gateio => instrument
                .strip_suffix("/USDT:USDT")
                .or_else(|| instrument.strip_suffix("/USDC:USDC"))
                .unwrap_or(instrument)
                .to_string(),
            Exchange::Hyperliquid => instrument.to_string(),
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aevo" => Ok(Exchange::Aevo),
            "bybit" => Ok(Exchange::Bybit),
            "gateio" | "gate" => Ok(Exchange::Gateio),
            "hyperliquid" => Ok(Exchange::Hyperliquid),
            other => Err(format!("unknown exchange '{other}'")),
        }
    }
}

/// One raw funding-rate observation as fetched upstream. `instrument` is in
/// the exchange-native format; `timestamp` is in the exchange-native unit.
#[derive(Debug, Clone)]
pub struct FundingTick {
    pub instrument: String,
    pub timestamp: i64,
    pub rate: String,
    pub mark_price: Option<String>,
}

/// One adapter per exchange. `fetch_history` pages through the venue's
/// funding-history endpoint for one instrument over a native-unit window and
/// never errors past this boundary: an exhausted retry budget yields whatever
/// partial data was accumulated, and an empty vec is a valid result.
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    fn exchange(&self) -> Exchange;

    async fn fetch_history(&self, instrument: &str, since: i64, until: i64) -> Vec<FundingTick>;
}

/// Bounded exponential backoff for one adapter. Injectable so tests can zero
/// the delays and exercise exhaustion without sleeping.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
}

const MAX_BACKOFF_MS: u64 = 16_000;

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            factor,
        }
    }

    /// Zero-delay policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 0, 1.0)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = (self.base_delay_ms as f64 * self.factor.powi(attempt as i32)) as u64;
        Duration::from_millis(ms.min(MAX_BACKOFF_MS))
    }
}

/// Issue a request with retries on transient upstream errors.
///
/// 429 sleeps for the server's `Retry-After` if present, otherwise the policy
/// backoff; 503 and transport errors use the policy backoff. Any other status
/// is returned to the caller as-is — permanent upstream errors (bad symbol,
/// 4xx) must not burn the retry budget.
pub async fn send_with_retry(
    build: impl Fn() -> reqwest::RequestBuilder,
    policy: &RetryPolicy,
    label: &str,
) -> Result<reqwest::Response, ExchangeError> {
    let mut attempt = 0;
    loop {
        let outcome = build().send().await;
        let wait = match outcome {
            Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                retry_after.unwrap_or_else(|| policy.delay(attempt))
            }
            Ok(resp) if resp.status() == StatusCode::SERVICE_UNAVAILABLE => policy.delay(attempt),
            Ok(resp) => return Ok(resp),
            Err(e) => {
                tracing::debug!("[{label}] request error: {e}");
                policy.delay(attempt)
            }
        };

        attempt += 1;
        if attempt >= policy.max_attempts {
            return Err(ExchangeError::RetriesExhausted(policy.max_attempts));
        }
        tracing::debug!(
            "[{label}] transient upstream error, retry {attempt}/{} in {wait:?}",
            policy.max_attempts
        );
        tokio::time::sleep(wait).await;
    }
}

/// Round-robin pool of browser user-agent strings. The Aevo adapter rotates
/// its request identity per call as an anti-throttling measure.
pub struct UserAgentPool {
    cursor: AtomicUsize,
}

const USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

impl UserAgentPool {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn next(&self) -> &'static str {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        USER_AGENTS[i % USER_AGENTS.len()]
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_stripping_per_exchange() {
        assert_eq!(Exchange::Aevo.ticker_of("BTC-PERP"), "BTC");
        assert_eq!(Exchange::Bybit.ticker_of("ETH/USDT:USDT"), "ETH");
        assert_eq!(Exchange::Gateio.ticker_of("SOL/USDC:USDC"), "SOL");
        assert_eq!(Exchange::Hyperliquid.ticker_of("DOGE"), "DOGE");
        // Unsuffixed names pass through untouched.
        assert_eq!(Exchange::Aevo.ticker_of("BTC"), "BTC");
    }

    #[test]
    fn unit_table_is_exhaustive_and_stable() {
        use crate::timeframe::TimeUnit;
        assert_eq!(Exchange::Aevo.time_unit(), TimeUnit::Micros);
        assert_eq!(Exchange::Bybit.time_unit(), TimeUnit::Millis);
        assert_eq!(Exchange::Gateio.time_unit(), TimeUnit::Seconds);
        assert_eq!(Exchange::Hyperliquid.time_unit(), TimeUnit::Millis);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::new(5, 1000, 2.0);
        assert_eq!(policy.delay(0), Duration::from_millis(1000));
        assert_eq!(policy.delay(1), Duration::from_millis(2000));
        assert_eq!(policy.delay(10), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(RetryPolicy::immediate(3).delay(2), Duration::ZERO);
    }

    #[test]
    fn user_agents_rotate() {
        let pool = UserAgentPool::new();
        let first = pool.next();
        let second = pool.next();
        assert_ne!(first, second);
        // Wraps around after the pool is exhausted.
        for _ in 0..USER_AGENTS.len() - 2 {
            pool.next();
        }
        assert_eq!(pool.next(), first);
    }
}
