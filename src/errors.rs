use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected data from exchange: {0}")]
    UnexpectedData(String),

    #[error("Retry budget exhausted after {0} attempts")]
    RetriesExhausted(u32),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Unified error type for API responses. Everything serializes to a JSON
/// body of the shape `{"error": "..."}` with a matching status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad_request: {0}")]
    BadRequest(String),

    #[error("not_found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("db_error: {0}")]
    Db(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_str) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            Self::Db(msg) => (StatusCode::INTERNAL_SERVER_ERROR, format!("db_error: {msg}")),
        };

        let body = json!({ "error": error_str });
        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Db(e.to_string())
    }
}
