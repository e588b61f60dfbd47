//! Customer-facing texts and the default receipt document.

use chrono::{DateTime, Utc};
use receipt_desk_core::receipt::{ReceiptFields, ReceiptRenderer, RenderError};
use receipt_desk_core::types::{Money, PaymentMode, Ticket, TicketId};
use std::fmt::Write as _;

/// Public link to a ticket's receipt
#[must_use]
pub fn receipt_link(base_url: &str, ticket_id: TicketId) -> String {
    format!("{}/receipts/{ticket_id}", base_url.trim_end_matches('/'))
}

/// SMS announcing an issued ticket
#[must_use]
pub fn issuance_message(
    amount: Money,
    ticket_number: &str,
    link: &str,
    reason: Option<&str>,
) -> String {
    let mut body = format!(
        "Payment of {amount} received. Receipt No {ticket_number}. View your receipt: {link}"
    );
    if let Some(reason) = reason {
        let _ = write!(body, "\nReason: {reason}");
    }
    body
}

/// SMS announcing an issued ticket, rebuilt from the stored row
#[must_use]
pub fn issuance_message_for(ticket: &Ticket, base_url: &str) -> String {
    issuance_message(
        ticket.payment_amount,
        &ticket.ticket_number,
        &receipt_link(base_url, ticket.id),
        ticket.reason_for_payment.as_deref(),
    )
}

/// SMS telling the customer a ticket was voided
#[must_use]
pub fn void_notice(ticket_number: &str, amount: Money, note: Option<&str>) -> String {
    format!(
        "Receipt No {ticket_number} for {amount} has been voided. Reason: {}",
        note.unwrap_or("no reason provided")
    )
}

/// Renders a self-contained HTML receipt.
#[derive(Debug, Clone, Default)]
pub struct HtmlReceiptRenderer;

impl ReceiptRenderer for HtmlReceiptRenderer {
    fn render(&self, fields: &ReceiptFields) -> Result<String, RenderError> {
        if fields.ticket_number.is_empty() {
            return Err(RenderError("ticket number is missing".to_string()));
        }

        let mut rows = vec![
            ("Receipt No", fields.ticket_number.clone()),
            ("Date", format_date(fields.date)),
            ("Customer", fields.customer_name.clone()),
            ("Phone", fields.customer_phone.clone()),
            ("Amount", fields.amount.to_string()),
            ("Payment mode", fields.payment_mode.label().to_string()),
        ];
        if let PaymentMode::Bank { receipt_number } = &fields.payment_mode {
            rows.push(("Bank receipt", receipt_number.clone()));
        }
        if let Some(reason) = &fields.reason_for_payment {
            rows.push(("Reason", reason.clone()));
        }
        rows.push(("Issued by", fields.agent_name.clone()));

        let mut html = String::from(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Payment receipt</title></head>\n<body>\n<h1>Payment receipt</h1>\n<table>\n",
        );
        for (label, value) in rows {
            let _ = writeln!(html, "<tr><th>{label}</th><td>{}</td></tr>", escape(&value));
        }
        html.push_str("</table>\n</body>\n</html>\n");
        Ok(html)
    }
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
