pub mod auth;
pub mod handlers;
pub mod models;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::aggregate::Aggregator;
use crate::catalog::Catalog;
use crate::status::StatusStore;
use crate::store::Store;

/// Shared state handed to every route handler.
pub struct AppState {
    pub aggregator: Aggregator,
    pub store: Store,
    pub catalog: Arc<Catalog>,
    pub status: StatusStore,
}

pub struct ApiServer {
    state: Arc<AppState>,
    token: Option<String>,
}

impl ApiServer {
    pub fn new(state: AppState, token: Option<String>) -> Self {
        Self {
            state: Arc::new(state),
            token,
        }
    }

    /// Binds to the given port and serves until ctrl-c.
    pub async fn run(self, port: u16) -> anyhow::Result<()> {
        let app = router::build(Arc::clone(&self.state), self.token.clone());
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!("API server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, gracefully stopping…");
}
