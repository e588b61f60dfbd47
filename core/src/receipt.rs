//! Receipt renderer interface.

use crate::types::{Money, PaymentMode};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Rendering failed; issuance stops before anything is persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Receipt rendering failed: {0}")]
pub struct RenderError(pub String);

/// Fields a receipt document is rendered from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptFields {
    /// Zero-padded ticket number
    pub ticket_number: String,
    /// Issuance date
    pub date: DateTime<Utc>,
    /// Customer name
    pub customer_name: String,
    /// Customer phone
    pub customer_phone: String,
    /// Agent name
    pub agent_name: String,
    /// Amount paid
    pub amount: Money,
    /// Cash or bank
    pub payment_mode: PaymentMode,
    /// Optional reason
    pub reason_for_payment: Option<String>,
}

/// Pure receipt renderer.
pub trait ReceiptRenderer: Send + Sync {
    /// Render the receipt document.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the document cannot be produced.
    fn render(&self, fields: &ReceiptFields) -> Result<String, RenderError>;
}
