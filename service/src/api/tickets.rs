//! Ticket API endpoints.
//!
//! - POST /api/tickets - Issue a ticket and notify the customer
//! - POST /api/tickets/:id/approve - Approve (auditor)
//! - POST /api/tickets/:id/reject - Reject (auditor)
//! - POST /api/tickets/:id/void - Void and notify the customer (auditor)
//! - POST /api/tickets/:id/resend - Re-notify and requeue a rejected ticket (agent)
//!
//! Every response body is a [`ServiceResponse`] envelope.

#![allow(clippy::missing_errors_doc)] // Handlers only return ApiError

use crate::error::{ServiceError, ServiceResponse};
use crate::issuance::{IssueTicketRequest, IssuedTicket};
use crate::server::error::ApiError;
use crate::server::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use receipt_desk_core::types::{Money, PaymentMode, Ticket, TicketId};
use serde::Deserialize;
use uuid::Uuid;

// ============================================================================
// Request Types
// ============================================================================

/// Payment mode as submitted by clients.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentModeInput {
    /// Cash
    Cash,
    /// Bank deposit
    Bank,
}

/// Request to issue a ticket.
#[derive(Debug, Deserialize)]
pub struct IssueTicketBody {
    /// Registered customer's phone number
    pub customer_phone: String,
    /// Issuing agent's display name
    pub agent_name: String,
    /// Decimal amount, e.g. `"500.00"`
    pub amount: String,
    /// Cash or bank
    pub payment_mode: PaymentModeInput,
    /// Bank receipt number (bank payments only)
    pub bank_receipt_number: Option<String>,
    /// Optional reason
    pub reason_for_payment: Option<String>,
}

impl TryFrom<IssueTicketBody> for IssueTicketRequest {
    type Error = ServiceError;

    fn try_from(body: IssueTicketBody) -> Result<Self, Self::Error> {
        let amount: Money = body.amount.parse().map_err(|_| {
            ServiceError::Validation(format!(
                "amount {:?} is not a valid decimal amount",
                body.amount
            ))
        })?;

        let payment_mode = match body.payment_mode {
            PaymentModeInput::Cash => PaymentMode::Cash,
            PaymentModeInput::Bank => PaymentMode::Bank {
                receipt_number: body.bank_receipt_number.unwrap_or_default(),
            },
        };

        Ok(Self {
            customer_phone: body.customer_phone,
            agent_name: body.agent_name,
            amount,
            payment_mode,
            reason_for_payment: body.reason_for_payment,
        })
    }
}

/// Auditor decision.
#[derive(Debug, Deserialize)]
pub struct AuditBody {
    /// Acting auditor's display name
    pub auditor: String,
    /// Optional note
    pub note: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Issue a ticket.
///
/// # Endpoint
///
/// ```text
/// POST /api/tickets
/// Content-Type: application/json
///
/// {
///   "customer_phone": "+255700000001",
///   "agent_name": "Amina",
///   "amount": "500.00",
///   "payment_mode": "cash",
///   "reason_for_payment": "School fees"
/// }
/// ```
///
/// # Response
///
/// - 201 Created: ticket, receipt HTML and delivery flag
/// - 422 Unprocessable Entity: validation or precondition failure
/// - 503 Service Unavailable: storage failure
pub async fn issue_ticket(
    State(state): State<AppState>,
    Json(body): Json<IssueTicketBody>,
) -> Result<(StatusCode, Json<ServiceResponse<IssuedTicket>>), ApiError> {
    let request = IssueTicketRequest::try_from(body)?;
    let issued = state.service.issue_ticket(request).await?;
    Ok((StatusCode::CREATED, Json(ServiceResponse::ok(issued))))
}

/// Approve a ticket.
pub async fn approve_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AuditBody>,
) -> Result<Json<ServiceResponse<Ticket>>, ApiError> {
    let ticket = state
        .service
        .approve_ticket(TicketId::from_uuid(id), &body.auditor, body.note.as_deref())
        .await?;
    Ok(Json(ServiceResponse::ok(ticket)))
}

/// Reject a ticket.
pub async fn reject_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AuditBody>,
) -> Result<Json<ServiceResponse<Ticket>>, ApiError> {
    let ticket = state
        .service
        .reject_ticket(TicketId::from_uuid(id), &body.auditor, body.note.as_deref())
        .await?;
    Ok(Json(ServiceResponse::ok(ticket)))
}

/// Void a ticket.
///
/// The customer notice is best effort; the ticket is voided either way.
pub async fn void_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AuditBody>,
) -> Result<Json<ServiceResponse<Ticket>>, ApiError> {
    let ticket = state
        .service
        .void_ticket(TicketId::from_uuid(id), &body.auditor, body.note.as_deref())
        .await?;
    Ok(Json(ServiceResponse::ok(ticket)))
}

/// Resend a rejected ticket.
///
/// # Response
///
/// - 200 OK: ticket back in `pending`
/// - 404 Not Found: unknown ticket
/// - 409 Conflict: ticket is not rejected
pub async fn resend_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceResponse<Ticket>>, ApiError> {
    let ticket = state.service.resend_ticket(TicketId::from_uuid(id)).await?;
    Ok(Json(ServiceResponse::ok(ticket)))
}
