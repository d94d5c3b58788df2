use std::net::SocketAddr;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use tokio_util::sync::CancellationToken;

use crate::Result;

async fn health() -> &'static str {
    "OK"
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

/// Serves the liveness probe until `token` is cancelled.
pub async fn serve(addr: SocketAddr, token: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Health check listening on {addr}");
    axum::serve(listener, router())
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;
    tracing::info!("Health check stopped");
    Ok(())
}
