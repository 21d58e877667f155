use serde::Serialize;

use crate::status::ScrapeStatus;

/// One entry of GET /coins.
#[derive(Debug, Serialize)]
pub struct CoinInfo {
    pub coin: String,
    pub logo: String,
    pub name: String,
}

/// Response for GET /coins.
#[derive(Debug, Serialize)]
pub struct CoinsResponse {
    pub data: Vec<CoinInfo>,
}

/// One windowed per-ticker sum of GET /funding/{exchange}.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRow {
    pub ticker: String,
    pub accumulated_funding: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeFundingMeta {
    pub exchange: String,
    pub date: String,
    pub time: String,
    pub sort_order: String,
    pub page: u32,
    pub per_page: u32,
    /// True when the window was empty and the rows carry the latest known
    /// rates instead.
    pub fallback: bool,
}

/// Response for GET /funding/{exchange}.
#[derive(Debug, Serialize)]
pub struct ExchangeFundingResponse {
    pub data: Vec<FundingRow>,
    pub meta: ExchangeFundingMeta,
}

/// Response for GET /status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub exchanges: Vec<ScrapeStatus>,
}
