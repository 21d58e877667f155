use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Router, middleware};
use axum_prometheus::PrometheusMetricLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::AppState;
use super::auth::{self, AuthToken};
use super::handlers;

/// Builds and returns the full Axum router with all routes and shared state.
/// The data routes sit behind the bearer-token check; /health and /metrics
/// stay open.
pub fn build(state: Arc<AppState>, token: Option<String>) -> Router {
    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let data_routes = Router::new()
        .route("/aggregated-funding", get(handlers::aggregated_funding))
        .route("/funding/{exchange}", get(handlers::exchange_funding))
        .route("/coins", get(handlers::coins))
        .route("/status", get(handlers::scrape_status))
        .layer(middleware::from_fn(auth::require_auth))
        .layer(Extension(AuthToken(token.unwrap_or_default())));

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/metrics",
            get(move || async move { metric_handle.render() }),
        )
        .merge(data_routes)
        .layer(prometheus_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
