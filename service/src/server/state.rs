//! Application state for the receipt desk HTTP server.

use crate::services::TicketService;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// It's cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Ticket issuance and audit operations
    pub service: Arc<TicketService>,

    /// Prometheus handle; `None` when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(service: Arc<TicketService>, metrics: Option<PrometheusHandle>) -> Self {
        Self { service, metrics }
    }
}
