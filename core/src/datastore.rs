//! Persistence interface consumed by the receipt desk.
//!
//! The storage driver itself (pooling, SQL dialect, reconnects) lives outside
//! this crate. Implementations:
//!
//! - `PostgresDatastore` (in `receipt-desk-postgres`): production storage
//! - `InMemoryDatastore` (in `receipt-desk-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! trait can be used as `Arc<dyn Datastore>`.

use crate::audit::AuditStatus;
use crate::types::{
    Agent, AgentId, Customer, CustomerHistoryEntry, DeliveryStatus, Ticket, TicketId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`Datastore`] methods.
pub type DatastoreFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, DatastoreError>> + Send + 'a>>;

/// Errors raised by a [`Datastore`].
///
/// Connection-class failures are distinguishable from data errors so callers
/// can decide whether a retry makes sense.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatastoreError {
    /// Transient connection failure (dropped socket, pool timeout, ...)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Another ticket of the same agent already carries this number
    #[error("Ticket number {ticket_number} is already used by agent {agent_id}")]
    DuplicateTicketNumber {
        /// Agent owning the range
        agent_id: AgentId,
        /// Conflicting zero-padded number
        ticket_number: String,
    },

    /// Any other storage failure (constraint, decoding, bad query)
    #[error("Data error: {0}")]
    Data(String),
}

impl DatastoreError {
    /// Whether the failure looks connection-related and is worth retrying
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Field-level update applied to a stored ticket.
///
/// `None` leaves a field untouched. Audit fields use a nested `Option` so a
/// patch can explicitly clear them (`Some(None)`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicketPatch {
    /// New delivery status
    pub delivery_status: Option<DeliveryStatus>,
    /// New audit status
    pub audit_status: Option<AuditStatus>,
    /// New auditor name (or cleared)
    pub audited_by: Option<Option<String>>,
    /// New audit timestamp (or cleared)
    pub audited_at: Option<Option<DateTime<Utc>>>,
    /// New audit note (or cleared)
    pub audit_note: Option<Option<String>>,
}

impl TicketPatch {
    /// Patch that only records a notification outcome
    #[must_use]
    pub fn delivery(status: DeliveryStatus) -> Self {
        Self {
            delivery_status: Some(status),
            ..Self::default()
        }
    }

    /// Apply the patch to an in-memory ticket
    pub fn apply_to(&self, ticket: &mut Ticket) {
        if let Some(status) = self.delivery_status {
            ticket.delivery_status = status;
        }
        if let Some(status) = self.audit_status {
            ticket.audit_status = status;
        }
        if let Some(by) = &self.audited_by {
            ticket.audited_by.clone_from(by);
        }
        if let Some(at) = self.audited_at {
            ticket.audited_at = at;
        }
        if let Some(note) = &self.audit_note {
            ticket.audit_note.clone_from(note);
        }
    }
}

/// Outcome of a guarded ticket update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Patch applied; carries the updated ticket
    Applied(Box<Ticket>),
    /// No ticket with that id
    NotFound,
    /// The stored audit status no longer matched the expected one
    StatusChanged {
        /// Status found in storage
        actual: AuditStatus,
    },
}

/// Durable storage for agents, customers, tickets and customer history.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared by all
/// concurrent requests.
pub trait Datastore: Send + Sync {
    /// Find an active-or-inactive customer by phone number.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError`] if the lookup fails.
    fn find_customer_by_phone<'a>(
        &'a self,
        phone_number: &'a str,
    ) -> DatastoreFuture<'a, Option<Customer>>;

    /// Find an issuing agent by display name.
    ///
    /// Staff accounts with other roles never match.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError`] if the lookup fails.
    fn find_agent_by_name<'a>(&'a self, name: &'a str) -> DatastoreFuture<'a, Option<Agent>>;

    /// Load an agent by id.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError`] if the lookup fails.
    fn find_agent_by_id(&self, agent_id: AgentId) -> DatastoreFuture<'_, Option<Agent>>;

    /// Conditionally set an agent's `current_number`.
    ///
    /// The write only happens while the stored value still equals `expected`
    /// (`None` matching a NULL column). Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError`] if the update fails.
    fn update_agent_current_number(
        &self,
        agent_id: AgentId,
        expected: Option<i64>,
        next: i64,
    ) -> DatastoreFuture<'_, bool>;

    /// Insert a new ticket.
    ///
    /// # Errors
    ///
    /// - [`DatastoreError::DuplicateTicketNumber`] if `(agent_id, ticket_number)` exists
    /// - other [`DatastoreError`] variants if the insert fails
    fn create_ticket<'a>(&'a self, ticket: &'a Ticket) -> DatastoreFuture<'a, ()>;

    /// Apply a field-level patch to a ticket.
    ///
    /// When `expected_status` is set, the patch is applied only if the stored
    /// audit status equals it; the check and the write are one atomic step.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError`] if the update fails.
    fn update_ticket_fields<'a>(
        &'a self,
        ticket_id: TicketId,
        expected_status: Option<AuditStatus>,
        patch: &'a TicketPatch,
    ) -> DatastoreFuture<'a, PatchOutcome>;

    /// Load a ticket by id.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError`] if the lookup fails.
    fn find_ticket_by_id(&self, ticket_id: TicketId) -> DatastoreFuture<'_, Option<Ticket>>;

    /// Append a customer-history entry.
    ///
    /// # Errors
    ///
    /// Returns [`DatastoreError`] if the insert fails.
    fn create_customer_history<'a>(
        &'a self,
        entry: &'a CustomerHistoryEntry,
    ) -> DatastoreFuture<'a, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentId, CustomerId, Money, PaymentMode};

    fn ticket() -> Ticket {
        Ticket {
            id: TicketId::new(),
            customer_id: CustomerId::new(),
            customer_name: "Jo".to_string(),
            customer_phone: Some("+255700000001".to_string()),
            agent_id: AgentId::new(),
            agent_name: "Amina".to_string(),
            payment_amount: Money::from_units(10),
            payment_mode: PaymentMode::Cash,
            ticket_number: "000001".to_string(),
            date: Utc::now(),
            reason_for_payment: None,
            delivery_status: DeliveryStatus::Failed,
            audit_status: AuditStatus::Rejected,
            audited_by: Some("Auditor".to_string()),
            audited_at: Some(Utc::now()),
            audit_note: Some("bad photo".to_string()),
            receipt_html: String::new(),
        }
    }

    #[test]
    fn test_patch_can_clear_audit_fields() {
        let mut t = ticket();
        let patch = TicketPatch {
            delivery_status: Some(DeliveryStatus::Sent),
            audit_status: Some(AuditStatus::Pending),
            audited_by: Some(None),
            audited_at: Some(None),
            audit_note: Some(Some("resent".to_string())),
        };
        patch.apply_to(&mut t);

        assert_eq!(t.delivery_status, DeliveryStatus::Sent);
        assert_eq!(t.audit_status, AuditStatus::Pending);
        assert_eq!(t.audited_by, None);
        assert_eq!(t.audited_at, None);
        assert_eq!(t.audit_note.as_deref(), Some("resent"));
    }

    #[test]
    fn test_empty_patch_leaves_ticket_untouched() {
        let mut t = ticket();
        let before = t.clone();
        TicketPatch::default().apply_to(&mut t);
        assert_eq!(t, before);
    }

    #[test]
    fn test_only_connection_errors_are_retryable() {
        assert!(DatastoreError::Connection("reset".into()).is_connection());
        assert!(!DatastoreError::Data("bad row".into()).is_connection());
    }
}
