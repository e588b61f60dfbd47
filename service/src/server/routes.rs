//! Router configuration for the receipt desk.

use super::health::{health_check, metrics};
use super::state::AppState;
use crate::api::tickets;
use axum::{
    routing::{get, post},
    Router,
};

/// Build the complete Axum router.
///
/// - `GET /health`, `GET /metrics`
/// - `POST /api/tickets`
/// - `POST /api/tickets/:id/{approve,reject,void,resend}`
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/tickets", post(tickets::issue_ticket))
        .route("/tickets/:id/approve", post(tickets::approve_ticket))
        .route("/tickets/:id/reject", post(tickets::reject_ticket))
        .route("/tickets/:id/void", post(tickets::void_ticket))
        .route("/tickets/:id/resend", post(tickets::resend_ticket));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .nest("/api", api_routes)
        .with_state(state)
}
