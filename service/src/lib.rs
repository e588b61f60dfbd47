//! # Receipt Desk Service
//!
//! Workflows for issuing and auditing payment receipts ("tickets"), plus the
//! HTTP surface and production adapters.
//!
//! ## Components
//!
//! - [`allocator::TicketNumberAllocator`]: race-free, per-agent ticket numbers
//! - [`dispatcher::NotificationDispatcher`]: bounded SMS dispatch with a named
//!   policy for unknown outcomes
//! - [`issuance::TicketIssuanceWorkflow`]: validate, allocate, render, persist,
//!   notify, record history
//! - [`audit::AuditLifecycle`]: approve, reject, void and resend on top of the
//!   [`audit::AuditReducer`]
//! - [`services::TicketService`]: facade wiring everything together
//! - [`server`] and [`api`]: axum router and handlers
//!
//! ## Example
//!
//! ```ignore
//! use receipt_desk_service::services::{ServiceSettings, TicketService};
//!
//! let service = TicketService::new(store, gateway, renderer, clock, &ServiceSettings::default());
//! let issued = service.issue_ticket(request).await?;
//! println!("{} delivered={}", issued.ticket.ticket_number, issued.delivery_succeeded);
//! ```

pub mod allocator;
pub mod api;
pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod issuance;
pub mod messages;
pub mod persistence;
pub mod server;
pub mod services;
pub mod sms_gateway;

pub use error::{ServiceError, ServiceResponse, ServiceResult};
pub use issuance::{IssueTicketRequest, IssuedTicket};
pub use services::{ServiceSettings, TicketService};
