//! Ticket issuance workflow.
//!
//! One call takes a validated request from customer lookup through number
//! allocation, rendering, persistence, customer notification and the
//! customer-history ledger. Observable side effects of a successful call: one
//! ticket row, one history row, one agent counter advance and at most one SMS.

use crate::allocator::TicketNumberAllocator;
use crate::dispatcher::NotificationDispatcher;
use crate::error::{ServiceError, ServiceResult};
use crate::messages;
use receipt_desk_core::audit::AuditStatus;
use receipt_desk_core::datastore::{Datastore, DatastoreError, PatchOutcome, TicketPatch};
use receipt_desk_core::environment::Clock;
use receipt_desk_core::receipt::{ReceiptFields, ReceiptRenderer};
use receipt_desk_core::types::{
    Agent, Customer, CustomerHistoryEntry, DeliveryStatus, HistoryId, Money, PaymentMode, Ticket,
    TicketId,
};
use receipt_desk_runtime::metrics::IssuanceMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// What an agent submits to issue a ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTicketRequest {
    /// Registered customer's phone number
    pub customer_phone: String,
    /// Issuing agent's display name
    pub agent_name: String,
    /// Amount paid
    pub amount: Money,
    /// Cash or bank (with the bank's receipt number)
    pub payment_mode: PaymentMode,
    /// Optional free-text reason
    pub reason_for_payment: Option<String>,
}

impl IssueTicketRequest {
    /// Trim inputs and reject malformed requests.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] describing the first problem found.
    pub fn validated(self) -> ServiceResult<Self> {
        let customer_phone = self.customer_phone.trim().to_string();
        if customer_phone.is_empty() {
            return Err(ServiceError::Validation("customer phone number is required".into()));
        }

        let agent_name = self.agent_name.trim().to_string();
        if agent_name.is_empty() {
            return Err(ServiceError::Validation("agent name is required".into()));
        }

        if !self.amount.is_positive() {
            return Err(ServiceError::Validation("amount must be greater than zero".into()));
        }

        let payment_mode = match self.payment_mode {
            PaymentMode::Cash => PaymentMode::Cash,
            PaymentMode::Bank { receipt_number } => {
                let receipt_number = receipt_number.trim().to_string();
                if receipt_number.is_empty() {
                    return Err(ServiceError::Validation(
                        "bank payments require the bank receipt number".into(),
                    ));
                }
                PaymentMode::Bank { receipt_number }
            }
        };

        let reason_for_payment = self
            .reason_for_payment
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty());

        Ok(Self {
            customer_phone,
            agent_name,
            amount: self.amount,
            payment_mode,
            reason_for_payment,
        })
    }
}

/// Result of a successful issuance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IssuedTicket {
    /// The persisted ticket
    pub ticket: Ticket,
    /// Rendered receipt document
    pub receipt_html: String,
    /// Whether the customer notification is treated as delivered
    pub delivery_succeeded: bool,
}

/// Issues tickets.
#[derive(Clone)]
pub struct TicketIssuanceWorkflow {
    store: Arc<dyn Datastore>,
    allocator: TicketNumberAllocator,
    dispatcher: NotificationDispatcher,
    renderer: Arc<dyn ReceiptRenderer>,
    clock: Arc<dyn Clock>,
    receipt_base_url: String,
    max_attempts: usize,
}

impl TicketIssuanceWorkflow {
    /// Create the workflow
    #[must_use]
    pub fn new(
        store: Arc<dyn Datastore>,
        allocator: TicketNumberAllocator,
        dispatcher: NotificationDispatcher,
        renderer: Arc<dyn ReceiptRenderer>,
        clock: Arc<dyn Clock>,
        receipt_base_url: impl Into<String>,
        max_attempts: usize,
    ) -> Self {
        Self {
            store,
            allocator,
            dispatcher,
            renderer,
            clock,
            receipt_base_url: receipt_base_url.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Issue a ticket.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] for malformed requests
    /// - [`ServiceError::CustomerNotRegistered`] / [`ServiceError::CustomerInactive`]
    /// - [`ServiceError::InvalidAgent`], [`ServiceError::NotConfigured`],
    ///   [`ServiceError::RangeExhausted`] from agent checks and allocation
    /// - [`ServiceError::Render`] if the receipt cannot be rendered (nothing is stored)
    /// - [`ServiceError::PersistenceFailed`] if storage fails after retries
    #[tracing::instrument(
        skip(self, request),
        fields(agent = %request.agent_name, phone = %request.customer_phone)
    )]
    pub async fn issue(&self, request: IssueTicketRequest) -> ServiceResult<IssuedTicket> {
        let started = Instant::now();
        let result = self.run(request).await;

        match &result {
            Ok(issued) => {
                IssuanceMetrics::record_issued(started.elapsed());
                tracing::info!(
                    ticket_id = %issued.ticket.id,
                    ticket_number = %issued.ticket.ticket_number,
                    delivered = issued.delivery_succeeded,
                    "Ticket issued"
                );
            }
            Err(err) => {
                IssuanceMetrics::record_failure(err.code());
                if err.is_precondition() || matches!(err, ServiceError::Validation(_)) {
                    tracing::info!(code = err.code(), error = %err, "Ticket issuance refused");
                } else {
                    tracing::error!(code = err.code(), error = %err, "Ticket issuance failed");
                }
            }
        }

        result
    }

    async fn run(&self, request: IssueTicketRequest) -> ServiceResult<IssuedTicket> {
        let request = request.validated()?;

        let customer = self.registered_customer(&request.customer_phone).await?;
        let agent = self.issuing_agent(&request.agent_name).await?;

        let (ticket, receipt_html) = self.persist_new_ticket(&request, &customer, agent).await?;

        let link = messages::receipt_link(&self.receipt_base_url, ticket.id);
        let body = messages::issuance_message(
            ticket.payment_amount,
            &ticket.ticket_number,
            &link,
            ticket.reason_for_payment.as_deref(),
        );
        let outcome = self.dispatcher.dispatch(&customer.phone_number, &body).await;
        let delivery_status = DeliveryStatus::from_delivered(outcome.delivered);

        let patch = TicketPatch::delivery(delivery_status);
        if let PatchOutcome::NotFound = self
            .store
            .update_ticket_fields(ticket.id, None, &patch)
            .await?
        {
            tracing::warn!(
                ticket_id = %ticket.id,
                "Ticket vanished before its delivery status was recorded"
            );
        }

        self.store
            .create_customer_history(&CustomerHistoryEntry {
                id: HistoryId::new(),
                customer_id: customer.id,
                ticket_id: ticket.id,
                ticket_number: ticket.ticket_number.clone(),
                amount: ticket.payment_amount,
                date: ticket.date,
                agent_name: ticket.agent_name.clone(),
            })
            .await?;

        let ticket = self.reload(ticket, &patch).await;

        Ok(IssuedTicket {
            ticket,
            receipt_html,
            delivery_succeeded: outcome.delivered,
        })
    }

    async fn registered_customer(&self, phone_number: &str) -> ServiceResult<Customer> {
        match self.store.find_customer_by_phone(phone_number).await? {
            None => Err(ServiceError::CustomerNotRegistered {
                phone_number: phone_number.to_string(),
            }),
            Some(customer) if !customer.is_active => {
                Err(ServiceError::CustomerInactive { name: customer.name })
            }
            Some(customer) => Ok(customer),
        }
    }

    async fn issuing_agent(&self, name: &str) -> ServiceResult<Agent> {
        match self.store.find_agent_by_name(name).await? {
            None => Err(ServiceError::InvalidAgent(format!(
                "no issuing agent named {name}"
            ))),
            Some(agent) if !agent.is_active => Err(ServiceError::InvalidAgent(format!(
                "agent {name} is inactive"
            ))),
            Some(agent) => Ok(agent),
        }
    }

    /// Allocate, render and store the ticket.
    ///
    /// A create that collides on `(agent, number)` allocates again; a collision
    /// with our own id means an earlier attempt already committed.
    async fn persist_new_ticket(
        &self,
        request: &IssueTicketRequest,
        customer: &Customer,
        mut agent: Agent,
    ) -> ServiceResult<(Ticket, String)> {
        let ticket_id = TicketId::new();
        let date = self.clock.now();

        for attempt in 1..=self.max_attempts {
            let number = self.allocator.allocate(&agent).await?;
            agent.current_number = Some(number.value());
            let ticket_number = number.formatted();

            let receipt_html = self.renderer.render(&ReceiptFields {
                ticket_number: ticket_number.clone(),
                date,
                customer_name: customer.name.clone(),
                customer_phone: customer.phone_number.clone(),
                agent_name: agent.name.clone(),
                amount: request.amount,
                payment_mode: request.payment_mode.clone(),
                reason_for_payment: request.reason_for_payment.clone(),
            })?;

            let ticket = Ticket {
                id: ticket_id,
                customer_id: customer.id,
                customer_name: customer.name.clone(),
                customer_phone: Some(customer.phone_number.clone()),
                agent_id: agent.id,
                agent_name: agent.name.clone(),
                payment_amount: request.amount,
                payment_mode: request.payment_mode.clone(),
                ticket_number,
                date,
                reason_for_payment: request.reason_for_payment.clone(),
                delivery_status: DeliveryStatus::Failed,
                audit_status: AuditStatus::Pending,
                audited_by: None,
                audited_at: None,
                audit_note: None,
                receipt_html: receipt_html.clone(),
            };

            match self.store.create_ticket(&ticket).await {
                Ok(()) => return Ok((ticket, receipt_html)),
                Err(DatastoreError::DuplicateTicketNumber { ticket_number, .. }) => {
                    if let Some(stored) = self.store.find_ticket_by_id(ticket_id).await? {
                        return Ok((stored, receipt_html));
                    }
                    tracing::warn!(
                        agent_id = %agent.id,
                        ticket_number = %ticket_number,
                        attempt,
                        "Ticket number already taken, allocating another"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        agent_id = %agent.id,
                        ticket_number = %ticket.ticket_number,
                        error = %err,
                        "Ticket could not be stored; the allocated number stays consumed"
                    );
                    return Err(err.into());
                }
            }
        }

        Err(ServiceError::PersistenceFailed(format!(
            "every ticket number allocated for agent {} was already taken",
            agent.name
        )))
    }

    async fn reload(&self, mut fallback: Ticket, patch: &TicketPatch) -> Ticket {
        match self.store.find_ticket_by_id(fallback.id).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => {
                patch.apply_to(&mut fallback);
                fallback
            }
            Err(err) => {
                tracing::warn!(
                    ticket_id = %fallback.id,
                    error = %err,
                    "Re-reading issued ticket failed, returning local copy"
                );
                patch.apply_to(&mut fallback);
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn request() -> IssueTicketRequest {
        IssueTicketRequest {
            customer_phone: " +255700000001 ".into(),
            agent_name: "Amina".into(),
            amount: Money::from_units(500),
            payment_mode: PaymentMode::Cash,
            reason_for_payment: Some("   ".into()),
        }
    }

    #[test]
    fn test_validation_trims_and_drops_blank_reason() {
        let valid = request().validated().unwrap();
        assert_eq!(valid.customer_phone, "+255700000001");
        assert_eq!(valid.reason_for_payment, None);
    }

    #[test]
    fn test_validation_rejects_bad_requests() {
        let cases = [
            IssueTicketRequest {
                customer_phone: "  ".into(),
                ..request()
            },
            IssueTicketRequest {
                agent_name: String::new(),
                ..request()
            },
            IssueTicketRequest {
                amount: Money::from_cents(0),
                ..request()
            },
            IssueTicketRequest {
                payment_mode: PaymentMode::Bank {
                    receipt_number: " ".into(),
                },
                ..request()
            },
        ];

        for case in cases {
            let err = case.validated().unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
    }
}
