//! Route configuration and setup

use crate::handlers::{download::download_file, health::health_check};
use crate::state::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

/// Mount point of the download route
pub const DOWNLOAD_ROUTE: &str = "/storage/download/{*path}";

/// Setup all application routes
pub fn setup_routes(state: Arc<AppState>) -> Router {
    let mut router = Router::new().route("/health", get(health_check));

    if state.config.download_route_enabled {
        router = router.route(DOWNLOAD_ROUTE, get(download_file));
    } else {
        tracing::info!("Download route disabled");
    }

    // Server-level concurrency limit to protect against resource exhaustion under extreme load
    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000)
        .max(1);
    tracing::info!(
        http_concurrency_limit = http_concurrency_limit,
        "HTTP concurrency limit layer enabled"
    );

    router
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
