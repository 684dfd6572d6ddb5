use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Intake endpoints for blog readers. The guard still refreshes the caller's session on
/// these paths but never redirects.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // POST /api/comments, GET /api/comments?postId=...
        .route(
            "/api/comments",
            post(handlers::add_comment).get(handlers::get_comments),
        )
        // POST /api/subscribe
        // Newsletter sign-up; rejects duplicates.
        .route("/api/subscribe", post(handlers::subscribe))
}
