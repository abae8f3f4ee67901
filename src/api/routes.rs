//! Router construction

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};
use crate::config::ServerConfig;

/// All endpoints with tracing and body-size limits.
///
/// Oversized bodies surface through the JSON extractor, so they get the
/// standard error body like any other rejection.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/api/v1/context/analyze", post(handlers::analyze_context))
        .route("/api/v1/rules/analyze", post(handlers::analyze_rules))
        .route("/api/v1/rules/proposal", post(handlers::rule_proposal))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(server.max_body_bytes)),
        )
        .with_state(state)
}
