//! Route configuration.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::state::AppState;

/// Path prefix reserved for server endpoints.
pub const INTERNAL_PREFIX: &str = "/_templet";

/// Create the router: internal endpoints plus the template fallback.
pub fn template_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest(INTERNAL_PREFIX, internal_routes())
        .fallback(handlers::render_template)
        .with_state(state)
}

fn internal_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::cache_stats))
}
