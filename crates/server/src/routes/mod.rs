// crates/server/src/routes/mod.rs
//! API route handlers for the packetpress server.

pub mod health;
pub mod jobs;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET  /api/health                      - Health check
/// - POST /api/jobs                        - Start a job
/// - GET  /api/jobs/{id}                   - Point-in-time job status (pull path)
/// - GET  /api/jobs/{id}/events            - SSE progress stream (push path)
/// - GET  /api/jobs/{id}/items/{item}/link - Short-lived per-item resource link
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", jobs::router())
        .with_state(state)
}
