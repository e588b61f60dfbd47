//! Prometheus metrics for observability and monitoring.
//!
//! Metric recorders for the receipt desk:
//! - Ticket issuance
//! - Ticket-number allocation
//! - Notification dispatch, labelled by resolution
//! - Audit actions
//! - Datastore retries
//!
//! # Example
//!
//! ```rust,no_run
//! use receipt_desk_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! let body = server.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs the global recorder and renders the scrape body; the HTTP route
/// serving it lives in the service crate.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the scrape endpoint is advertised on (for logging)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), the call
    /// logs a warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics recorder installed - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!(
                        "Metrics recorder already initialized, skipping re-initialization"
                    );
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this instance.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Issuance
    describe_counter!(
        "receipt_desk_tickets_issued_total",
        "Total number of tickets persisted"
    );
    describe_counter!(
        "receipt_desk_issue_failures_total",
        "Total number of failed issuance requests, by error code"
    );
    describe_histogram!(
        "receipt_desk_issue_duration_seconds",
        "Time taken to issue a ticket, including the notification"
    );

    // Allocation
    describe_counter!(
        "receipt_desk_numbers_allocated_total",
        "Total number of ticket numbers handed out"
    );
    describe_counter!(
        "receipt_desk_allocation_conflicts_total",
        "Total number of lost compare-and-set races while allocating"
    );
    describe_counter!(
        "receipt_desk_allocation_resets_total",
        "Total number of counters reset to the start of their range"
    );
    describe_counter!(
        "receipt_desk_ranges_exhausted_total",
        "Total number of allocations refused because the range was used up"
    );

    // Notifications
    describe_counter!(
        "receipt_desk_notifications_total",
        "Total number of notification dispatches, by resolution"
    );
    describe_histogram!(
        "receipt_desk_notification_duration_seconds",
        "Time until a notification dispatch resolved"
    );

    // Audit
    describe_counter!(
        "receipt_desk_audit_actions_total",
        "Total number of applied audit actions, by action"
    );
    describe_counter!(
        "receipt_desk_audit_rejections_total",
        "Total number of refused audit transitions, by action"
    );

    // Retry
    describe_counter!(
        "receipt_desk_datastore_retries_total",
        "Total number of datastore retry attempts"
    );
    describe_counter!(
        "receipt_desk_datastore_retry_successes_total",
        "Total number of datastore calls that succeeded after retrying"
    );
    describe_counter!(
        "receipt_desk_datastore_retries_exhausted_total",
        "Total number of datastore calls that failed after max attempts"
    );
}

/// Issuance metrics recorder.
pub struct IssuanceMetrics;

impl IssuanceMetrics {
    /// Record a persisted ticket.
    pub fn record_issued(duration: Duration) {
        counter!("receipt_desk_tickets_issued_total").increment(1);
        histogram!("receipt_desk_issue_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed issuance.
    pub fn record_failure(code: &'static str) {
        counter!("receipt_desk_issue_failures_total", "code" => code).increment(1);
    }
}

/// Allocation metrics recorder.
pub struct AllocationMetrics;

impl AllocationMetrics {
    /// Record a number handed out.
    pub fn record_allocated() {
        counter!("receipt_desk_numbers_allocated_total").increment(1);
    }

    /// Record a lost race.
    pub fn record_conflict() {
        counter!("receipt_desk_allocation_conflicts_total").increment(1);
    }

    /// Record a counter reset.
    pub fn record_reset() {
        counter!("receipt_desk_allocation_resets_total").increment(1);
    }

    /// Record an exhausted range.
    pub fn record_exhausted() {
        counter!("receipt_desk_ranges_exhausted_total").increment(1);
    }
}

/// Notification metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a resolved dispatch.
    pub fn record_dispatch(resolution: &'static str, duration: Duration) {
        counter!("receipt_desk_notifications_total", "resolution" => resolution).increment(1);
        histogram!("receipt_desk_notification_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Audit metrics recorder.
pub struct AuditMetrics;

impl AuditMetrics {
    /// Record an applied audit action.
    pub fn record_action(action: &'static str) {
        counter!("receipt_desk_audit_actions_total", "action" => action).increment(1);
    }

    /// Record a refused transition.
    pub fn record_rejection(action: &'static str) {
        counter!("receipt_desk_audit_rejections_total", "action" => action).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("receipt_desk_datastore_retries_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("receipt_desk_datastore_retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("receipt_desk_datastore_retries_exhausted_total").increment(1);
    }
}
