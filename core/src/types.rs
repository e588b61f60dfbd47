//! Domain types for the receipt desk.
//!
//! Value objects, entities and the pure ticket-number arithmetic shared by the
//! persistence adapters and the service layer.

use crate::audit::AuditStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an agent (any staff account)
    AgentId
);
uuid_id!(
    /// Unique identifier for a customer
    CustomerId
);
uuid_id!(
    /// Unique identifier for a ticket
    TicketId
);
uuid_id!(
    /// Unique identifier for a customer-history entry
    HistoryId
);

// ============================================================================
// Value Objects
// ============================================================================

/// Money amount stored in minor units (cents).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    /// Amount in cents
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Whether the amount is strictly greater than zero
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Error returned when a textual amount cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid amount '{0}': expected a decimal with at most two fractional digits")]
pub struct ParseMoneyError(pub String);

impl FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ParseMoneyError(s.to_string());

        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty() || fraction.len() > 2 {
            return Err(err());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }

        let units: i64 = whole.parse().map_err(|_| err())?;
        let cents: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| err())? * 10,
            _ => fraction.parse().map_err(|_| err())?,
        };

        units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .map(Self)
            .ok_or_else(err)
    }
}

/// A ticket number allocated from an agent's range.
///
/// Rendered as a fixed-width, zero-padded decimal (`000042`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(i64);

impl TicketNumber {
    /// Display width of a formatted ticket number
    pub const WIDTH: usize = 6;

    /// Wrap a raw number
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw numeric value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Zero-padded representation stored on the ticket
    #[must_use]
    pub fn formatted(&self) -> String {
        format!("{:0width$}", self.0, width = Self::WIDTH)
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

/// How the customer paid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PaymentMode {
    /// Cash handed to the agent
    Cash,
    /// Bank deposit, identified by the bank's receipt number
    Bank {
        /// Receipt number printed by the bank
        receipt_number: String,
    },
}

impl PaymentMode {
    /// Short label used in messages and storage
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Bank { .. } => "bank",
        }
    }

    /// Bank receipt number, if any
    #[must_use]
    pub fn bank_receipt_number(&self) -> Option<&str> {
        match self {
            Self::Cash => None,
            Self::Bank { receipt_number } => Some(receipt_number),
        }
    }
}

/// Whether the customer notification for a ticket is considered sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Treated as delivered
    Sent,
    /// Not delivered (also the placeholder until a dispatch resolves)
    Failed,
}

impl DeliveryStatus {
    /// Map a dispatcher verdict to a status
    #[must_use]
    pub const fn from_delivered(delivered: bool) -> Self {
        if delivered { Self::Sent } else { Self::Failed }
    }

    /// Database string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Parse from the database string representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Role of a staff account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    /// Issues tickets from a numbered range
    IssuingAgent,
    /// Approves, rejects and voids tickets
    Auditor,
    /// Account administration
    Admin,
}

impl StaffRole {
    /// Database string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IssuingAgent => "agent",
            Self::Auditor => "auditor",
            Self::Admin => "admin",
        }
    }

    /// Parse from the database string representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent" => Some(Self::IssuingAgent),
            "auditor" => Some(Self::Auditor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A billing agent that issues tickets from an assigned numeric range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Agent ID
    pub id: AgentId,
    /// Display name (natural key for lookups)
    pub name: String,
    /// Staff role
    pub role: StaffRole,
    /// First number of the range (inclusive)
    pub range_start: Option<i64>,
    /// Last number of the range (inclusive)
    pub range_end: Option<i64>,
    /// Last number issued; `None` means uninitialized
    pub current_number: Option<i64>,
    /// Whether the account is active
    pub is_active: bool,
}

/// Errors from ticket-number arithmetic.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// The agent has no usable range assigned
    #[error("no ticket number range is configured for this agent")]
    NotConfigured,

    /// The next number would exceed the end of the range
    #[error("ticket number range exhausted (range ends at {range_end})")]
    Exhausted {
        /// Last number of the range
        range_end: i64,
    },
}

/// Result of planning the next allocation for an agent.
///
/// `expected` is the stored `current_number` the plan was computed from; the
/// advance must only be committed while the store still holds that value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumberPlan {
    /// Number to hand out
    pub number: TicketNumber,
    /// Stored value observed when planning
    pub expected: Option<i64>,
    /// Whether the stored value was invalid and is being reset to the range start
    pub reset: bool,
}

impl Agent {
    /// Inclusive range bounds, if both are set and ordered
    #[must_use]
    pub const fn range(&self) -> Option<(i64, i64)> {
        match (self.range_start, self.range_end) {
            (Some(start), Some(end)) if start <= end => Some((start, end)),
            _ => None,
        }
    }

    /// Stored `current_number`, only if it lies inside the range
    #[must_use]
    pub fn valid_current_number(&self) -> Option<i64> {
        let (start, end) = self.range()?;
        self.current_number.filter(|n| (start..=end).contains(n))
    }

    /// Plan the next ticket number.
    ///
    /// An uninitialized or out-of-range `current_number` restarts at
    /// `range_start`, which is itself the number handed out.
    ///
    /// # Errors
    ///
    /// - [`RangeError::NotConfigured`] when no range is assigned
    /// - [`RangeError::Exhausted`] when `current_number + 1` passes `range_end`
    pub fn plan_next_number(&self) -> Result<NumberPlan, RangeError> {
        let (start, end) = self.range().ok_or(RangeError::NotConfigured)?;

        match self.valid_current_number() {
            None => Ok(NumberPlan {
                number: TicketNumber::new(start),
                expected: self.current_number,
                reset: true,
            }),
            Some(current) => {
                let candidate = current
                    .checked_add(1)
                    .filter(|n| *n <= end)
                    .ok_or(RangeError::Exhausted { range_end: end })?;
                Ok(NumberPlan {
                    number: TicketNumber::new(candidate),
                    expected: Some(current),
                    reset: false,
                })
            }
        }
    }
}

/// A registered customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer ID
    pub id: CustomerId,
    /// Display name
    pub name: String,
    /// Phone number (unique)
    pub phone_number: String,
    /// Whether tickets may be issued for this customer
    pub is_active: bool,
}

/// A persisted payment receipt.
///
/// Customer and agent names are copied at issuance so the record stays
/// historically accurate when those accounts change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,
    /// Customer the ticket was issued for
    pub customer_id: CustomerId,
    /// Customer name at issuance
    pub customer_name: String,
    /// Customer phone at issuance
    pub customer_phone: Option<String>,
    /// Issuing agent
    pub agent_id: AgentId,
    /// Agent name at issuance
    pub agent_name: String,
    /// Amount paid
    pub payment_amount: Money,
    /// Cash or bank
    pub payment_mode: PaymentMode,
    /// Agent-scoped number, zero-padded
    pub ticket_number: String,
    /// Issuance date
    pub date: DateTime<Utc>,
    /// Free-text reason for the payment
    pub reason_for_payment: Option<String>,
    /// Notification outcome
    pub delivery_status: DeliveryStatus,
    /// Audit lifecycle state
    pub audit_status: AuditStatus,
    /// Auditor who last acted
    pub audited_by: Option<String>,
    /// When the last audit action happened
    pub audited_at: Option<DateTime<Utc>>,
    /// Note attached to the last audit action
    pub audit_note: Option<String>,
    /// Rendered receipt document
    pub receipt_html: String,
}

/// Append-only ledger entry linking a customer to an issued ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerHistoryEntry {
    /// Entry ID
    pub id: HistoryId,
    /// Customer
    pub customer_id: CustomerId,
    /// Ticket the entry records
    pub ticket_id: TicketId,
    /// Ticket number, zero-padded
    pub ticket_number: String,
    /// Amount paid
    pub amount: Money,
    /// Issuance date
    pub date: DateTime<Utc>,
    /// Issuing agent's name
    pub agent_name: String,
}
