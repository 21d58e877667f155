use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::exchanges::Exchange;

pub const FALLBACK_LOGO: &str = "https://cryptologos.cc/logos/default-logo.png";

#[derive(Debug, Deserialize)]
struct LogoEntry {
    symbol: String,
    name: String,
}

/// Static instrument lists per exchange plus the symbol → display-name lookup,
/// loaded once at startup from `data_const/`. Read-only after that.
pub struct Catalog {
    instruments: HashMap<Exchange, Vec<String>>,
    names: HashMap<String, String>,
}

impl Catalog {
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let mut instruments = HashMap::new();
        for exchange in Exchange::ALL {
            let file = match exchange {
                Exchange::Aevo => "avail_aevo.json",
                Exchange::Bybit => "avail_bybit.json",
                Exchange::Gateio => "avail_gate.json",
                Exchange::Hyperliquid => "avail_hyperliquid.json",
            };
            let path = dir.join(file);
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading instrument list {}", path.display()))?;
            let list: Vec<String> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing instrument list {}", path.display()))?;
            instruments.insert(exchange, list);
        }

        let path = dir.join("crypto_logos.json");
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading logo lookup {}", path.display()))?;
        let entries: HashMap<String, LogoEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing logo lookup {}", path.display()))?;
        let names = entries
            .into_values()
            .map(|e| (e.symbol.to_uppercase(), e.name))
            .collect();

        Ok(Self { instruments, names })
    }

    #[cfg(test)]
    pub fn from_parts(
        instruments: HashMap<Exchange, Vec<String>>,
        names: HashMap<String, String>,
    ) -> Self {
        Self { instruments, names }
    }

    /// Exchange-native instrument names for one exchange.
    pub fn instruments(&self, exchange: Exchange) -> &[String] {
        self.instruments
            .get(&exchange)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The canonical ticker set: suffix-stripped union across all four
    /// exchanges, deduplicated and sorted lexicographically.
    pub fn union_tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self
            .instruments
            .iter()
            .flat_map(|(exchange, list)| list.iter().map(|i| exchange.ticker_of(i)))
            .collect();
        tickers.sort();
        tickers.dedup();
        tickers
    }

    /// Display metadata for one ticker: `(logo_url, name)`, with a fixed
    /// fallback logo and the ticker itself as the fallback name.
    pub fn display_info(&self, ticker: &str) -> (String, String) {
        match self.names.get(&ticker.to_uppercase()) {
            Some(name) => {
                let slug = name.to_lowercase().replace(' ', "-");
                let logo = format!(
                    "https://cryptologos.cc/logos/{slug}-{}-logo.png",
                    ticker.to_lowercase()
                );
                (logo, name.clone())
            }
            None => (FALLBACK_LOGO.to_string(), ticker.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Catalog {
        let mut instruments = HashMap::new();
        instruments.insert(
            Exchange::Aevo,
            vec!["BTC-PERP".to_string(), "ETH-PERP".to_string()],
        );
        instruments.insert(Exchange::Bybit, vec!["BTC/USDT:USDT".to_string()]);
        instruments.insert(
            Exchange::Gateio,
            vec!["SOL/USDT:USDT".to_string(), "BTC/USDT:USDT".to_string()],
        );
        instruments.insert(Exchange::Hyperliquid, vec!["DOGE".to_string()]);
        let names = HashMap::from([("BTC".to_string(), "Bitcoin".to_string())]);
        Catalog::from_parts(instruments, names)
    }

    #[test]
    fn union_is_stripped_sorted_and_deduped() {
        assert_eq!(sample().union_tickers(), vec!["BTC", "DOGE", "ETH", "SOL"]);
    }

    #[test]
    fn display_info_builds_logo_url() {
        let (logo, name) = sample().display_info("btc");
        assert_eq!(logo, "https://cryptologos.cc/logos/bitcoin-btc-logo.png");
        assert_eq!(name, "Bitcoin");
    }

    #[test]
    fn display_info_falls_back_on_miss() {
        let (logo, name) = sample().display_info("WIF");
        assert_eq!(logo, FALLBACK_LOGO);
        assert_eq!(name, "WIF");
    }
}
