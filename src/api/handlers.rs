use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Deserialize;

use super::AppState;
use super::models::{
    CoinInfo, CoinsResponse, ExchangeFundingMeta, ExchangeFundingResponse, FundingRow,
    StatusResponse,
};
use crate::aggregate::AggregateResponse;
use crate::errors::ApiError;
use crate::exchanges::Exchange;
use crate::store::SortOrder;
use crate::timeframe::Timeframe;

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

fn default_time() -> String {
    "1h".to_string()
}

fn default_sort() -> String {
    "asc".to_string()
}

/// The shared query-string shape of all funding endpoints.
#[derive(Debug, Deserialize)]
pub struct FundingQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default = "default_sort")]
    pub sort_order: String,
    pub keyword: Option<String>,
}

impl FundingQuery {
    fn parsed(&self) -> Result<(Timeframe, SortOrder), ApiError> {
        let time = self.time.parse::<Timeframe>().map_err(ApiError::BadRequest)?;
        let sort = self
            .sort_order
            .parse::<SortOrder>()
            .map_err(ApiError::BadRequest)?;
        Ok((time, sort))
    }
}

#[derive(Debug, Deserialize)]
pub struct CoinsQuery {
    pub keyword: Option<String>,
}

/// GET /health — simple liveness check
pub async fn health() -> &'static str {
    "OK"
}

/// GET /aggregated-funding — the cross-exchange funding view
pub async fn aggregated_funding(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FundingQuery>,
) -> Result<Json<AggregateResponse>, ApiError> {
    let (time, sort_order) = query.parsed()?;
    let response = state.aggregator.aggregate(
        time,
        query.page,
        query.limit,
        sort_order,
        query.keyword.as_deref(),
    )?;
    Ok(Json(response))
}

/// GET /funding/{exchange} — windowed per-ticker sums for one exchange
pub async fn exchange_funding(
    State(state): State<Arc<AppState>>,
    Path(exchange): Path<String>,
    Query(query): Query<FundingQuery>,
) -> Result<Json<ExchangeFundingResponse>, ApiError> {
    let exchange = exchange.parse::<Exchange>().map_err(ApiError::NotFound)?;
    let (time, sort_order) = query.parsed()?;

    let page = query.page.max(1);
    let limit = query.limit.max(1);
    let (since_ms, until_ms) = time.resolve_window();
    let windowed = state.store.accumulated_funding_paginated(
        exchange,
        page,
        limit,
        since_ms,
        until_ms,
        sort_order,
        query.keyword.as_deref(),
    )?;

    let data = windowed
        .rows
        .into_iter()
        .map(|(ticker, sum)| FundingRow {
            ticker,
            accumulated_funding: sum.to_string(),
        })
        .collect();

    Ok(Json(ExchangeFundingResponse {
        data,
        meta: ExchangeFundingMeta {
            exchange: exchange.name().to_string(),
            date: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            time: time.as_str().to_string(),
            sort_order: sort_order.as_str().to_string(),
            page,
            per_page: limit,
            fallback: windowed.fallback,
        },
    }))
}

/// GET /coins — the canonical coin catalog with display metadata
pub async fn coins(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CoinsQuery>,
) -> Json<CoinsResponse> {
    let mut tickers = state.catalog.union_tickers();
    if let Some(keyword) = &query.keyword {
        let needle = keyword.to_lowercase();
        tickers.retain(|t| t.to_lowercase().contains(&needle));
    }

    let data = tickers
        .into_iter()
        .map(|ticker| {
            let (logo, name) = state.catalog.display_info(&ticker);
            CoinInfo {
                coin: ticker,
                logo,
                name,
            }
        })
        .collect();

    Json(CoinsResponse { data })
}

/// GET /status — last scrape outcome per exchange
pub async fn scrape_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        exchanges: state.status.all(),
    })
}
