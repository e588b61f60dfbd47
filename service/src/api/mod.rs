//! API endpoints for the receipt desk.
//!
//! - Tickets: issuance and the audit lifecycle

pub mod tickets;
