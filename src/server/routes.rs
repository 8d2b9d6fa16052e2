//! Router configuration for the API server.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Uploads arrive as multipart; leave headroom over the raw ceiling
    // for boundaries and the parser field.
    let body_limit = state.settings.max_upload_bytes() as usize + 64 * 1024;

    Router::new()
        // Health check for container orchestration
        .route("/health", get(handlers::health))
        // Job lifecycle
        .route("/api/v1/upload", post(handlers::upload))
        .route("/api/v1/status/:job_id", get(handlers::status))
        .route("/api/v1/result/:job_id", get(handlers::result))
        // Orchestration
        .route("/api/v1/upload/batch", post(handlers::upload_batch))
        .route("/api/v1/compare", post(handlers::compare))
        // Operational introspection
        .route("/api/v1/stats", get(handlers::stats))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
