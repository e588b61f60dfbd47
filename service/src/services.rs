//! Service layer for the receipt desk.
//!
//! [`TicketService`] wires the datastore, the SMS gateway, the renderer and
//! the clock into the issuance and audit workflows and exposes the five
//! produced operations.

use crate::allocator::{DEFAULT_ALLOCATION_ATTEMPTS, TicketNumberAllocator};
use crate::audit::AuditLifecycle;
use crate::config::Config;
use crate::dispatcher::{DEFAULT_SEND_BUDGET, NotificationDispatcher, UnresolvedDeliveryPolicy};
use crate::error::ServiceResult;
use crate::issuance::{IssueTicketRequest, IssuedTicket, TicketIssuanceWorkflow};
use crate::persistence::RetryingDatastore;
use receipt_desk_core::datastore::Datastore;
use receipt_desk_core::environment::Clock;
use receipt_desk_core::notification::NotificationGateway;
use receipt_desk_core::receipt::ReceiptRenderer;
use receipt_desk_core::types::{Ticket, TicketId};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for [`TicketService`].
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    /// Base URL for receipt links
    pub receipt_base_url: String,
    /// Budget for one SMS send
    pub send_budget: Duration,
    /// How unknown SMS outcomes are recorded
    pub delivery_policy: UnresolvedDeliveryPolicy,
    /// Attempts per datastore call on connection errors
    pub datastore_max_attempts: usize,
    /// Linear backoff step between datastore attempts
    pub datastore_backoff: Duration,
    /// Conditional-update attempts per allocation
    pub allocation_max_attempts: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            receipt_base_url: "http://localhost:8080".to_string(),
            send_budget: DEFAULT_SEND_BUDGET,
            delivery_policy: UnresolvedDeliveryPolicy::AssumeDelivered,
            datastore_max_attempts: 3,
            datastore_backoff: Duration::from_millis(250),
            allocation_max_attempts: DEFAULT_ALLOCATION_ATTEMPTS,
        }
    }
}

impl ServiceSettings {
    /// Settings from loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            receipt_base_url: config.receipts.base_url.clone(),
            send_budget: Duration::from_secs(config.sms.send_timeout_secs),
            delivery_policy: UnresolvedDeliveryPolicy::AssumeDelivered,
            datastore_max_attempts: config.retry.datastore_max_attempts,
            datastore_backoff: Duration::from_millis(config.retry.datastore_backoff_ms),
            allocation_max_attempts: config.retry.allocation_max_attempts,
        }
    }
}

/// Entry point for issuing and auditing tickets.
#[derive(Clone)]
pub struct TicketService {
    issuance: TicketIssuanceWorkflow,
    audit: AuditLifecycle,
    gateway_configured: bool,
}

impl TicketService {
    /// Wire the service.
    ///
    /// Every datastore call made by the service goes through a
    /// [`RetryingDatastore`] built from `settings`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Datastore>,
        gateway: Arc<dyn NotificationGateway>,
        renderer: Arc<dyn ReceiptRenderer>,
        clock: Arc<dyn Clock>,
        settings: &ServiceSettings,
    ) -> Self {
        let gateway_configured = gateway.is_configured();
        let store: Arc<dyn Datastore> = Arc::new(RetryingDatastore::linear(
            store,
            settings.datastore_max_attempts,
            settings.datastore_backoff,
        ));
        let dispatcher =
            NotificationDispatcher::new(gateway, settings.send_budget, settings.delivery_policy);
        let allocator =
            TicketNumberAllocator::new(Arc::clone(&store), settings.allocation_max_attempts);

        let issuance = TicketIssuanceWorkflow::new(
            Arc::clone(&store),
            allocator,
            dispatcher.clone(),
            renderer,
            Arc::clone(&clock),
            settings.receipt_base_url.clone(),
            settings.allocation_max_attempts,
        );
        let audit = AuditLifecycle::new(
            store,
            dispatcher,
            clock,
            settings.receipt_base_url.clone(),
        );

        Self {
            issuance,
            audit,
            gateway_configured,
        }
    }

    /// Whether SMS notifications will actually be sent
    #[must_use]
    pub const fn gateway_configured(&self) -> bool {
        self.gateway_configured
    }

    /// Issue a ticket and notify the customer.
    ///
    /// # Errors
    ///
    /// See [`TicketIssuanceWorkflow::issue`].
    pub async fn issue_ticket(&self, request: IssueTicketRequest) -> ServiceResult<IssuedTicket> {
        self.issuance.issue(request).await
    }

    /// Approve a ticket.
    ///
    /// # Errors
    ///
    /// See [`AuditLifecycle::approve`].
    pub async fn approve_ticket(
        &self,
        ticket_id: TicketId,
        auditor: &str,
        note: Option<&str>,
    ) -> ServiceResult<Ticket> {
        self.audit.approve(ticket_id, auditor, note).await
    }

    /// Reject a ticket.
    ///
    /// # Errors
    ///
    /// See [`AuditLifecycle::reject`].
    pub async fn reject_ticket(
        &self,
        ticket_id: TicketId,
        auditor: &str,
        note: Option<&str>,
    ) -> ServiceResult<Ticket> {
        self.audit.reject(ticket_id, auditor, note).await
    }

    /// Void a ticket.
    ///
    /// # Errors
    ///
    /// See [`AuditLifecycle::void`].
    pub async fn void_ticket(
        &self,
        ticket_id: TicketId,
        auditor: &str,
        note: Option<&str>,
    ) -> ServiceResult<Ticket> {
        self.audit.void(ticket_id, auditor, note).await
    }

    /// Resend a rejected ticket.
    ///
    /// # Errors
    ///
    /// See [`AuditLifecycle::resend`].
    pub async fn resend_ticket(&self, ticket_id: TicketId) -> ServiceResult<Ticket> {
        self.audit.resend(ticket_id).await
    }
}
