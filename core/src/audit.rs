//! Audit lifecycle states and the transition table.
//!
//! ```text
//! Pending ──approve──▶ Approved ──void──▶ Voided
//!    │ ▲                                   ▲
//! reject│ resend                           │
//!    ▼ │                                   │
//! Rejected ───────────────void─────────────┘
//! ```
//!
//! Every legal move is listed in [`AuditStatus::apply`]; anything not listed
//! there is a [`TransitionError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fixed note written on a ticket when an agent resubmits it after rejection.
pub const RESEND_AUDIT_NOTE: &str = "Resubmitted by agent after rejection";

/// Approval-workflow state of a ticket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Awaiting an auditor (initial state)
    #[default]
    Pending,
    /// Funds confirmed
    Approved,
    /// Sent back to the agent
    Rejected,
    /// Cancelled; terminal
    Voided,
}

/// An audit lifecycle action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Auditor confirms the payment
    Approve,
    /// Auditor sends the ticket back
    Reject,
    /// Auditor cancels the ticket
    Void,
    /// Agent resubmits a rejected ticket
    Resend,
}

impl AuditAction {
    /// Lowercase name used in logs and metrics labels
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Void => "void",
            Self::Resend => "resend",
        }
    }
}

/// A rejected audit transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The ticket is voided; nothing may change it any more
    #[error("ticket has been voided and can no longer be {}", past_tense(.action))]
    Voided {
        /// Attempted action
        action: AuditAction,
    },

    /// Only rejected tickets can be resent
    #[error("only rejected tickets can be resent; this ticket is {current}")]
    NotRejected {
        /// Current status
        current: AuditStatus,
    },

    /// The ticket has already been handled for this action
    #[error("ticket is already {current}; it cannot be {}", past_tense(.action))]
    AlreadyHandled {
        /// Current status
        current: AuditStatus,
        /// Attempted action
        action: AuditAction,
    },

    /// Another writer changed the ticket between load and update
    #[error("ticket was changed concurrently and is now {current}; reload and try again")]
    ConcurrentUpdate {
        /// Status found in storage
        current: AuditStatus,
    },
}

const fn past_tense(action: &AuditAction) -> &'static str {
    match action {
        AuditAction::Approve => "approved",
        AuditAction::Reject => "rejected",
        AuditAction::Void => "voided",
        AuditAction::Resend => "resent",
    }
}

impl AuditStatus {
    /// Transition table: `current × action → next | error`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransitionError`] for every pair not listed as legal.
    pub const fn apply(self, action: AuditAction) -> Result<Self, TransitionError> {
        use AuditAction::{Approve, Reject, Resend, Void};
        use AuditStatus::{Approved, Pending, Rejected, Voided};

        match (self, action) {
            (Pending | Rejected, Approve) => Ok(Approved),
            (Pending | Rejected, Reject) => Ok(Rejected),
            (Pending | Rejected | Approved, Void) => Ok(Voided),
            (Rejected, Resend) => Ok(Pending),

            (Voided, Resend) => Err(TransitionError::NotRejected { current: Voided }),
            (Voided, action) => Err(TransitionError::Voided { action }),
            (current @ (Pending | Approved), action) => {
                Err(TransitionError::AlreadyHandled { current, action })
            }
        }
    }

    /// Whether no further audit action can change this status
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Voided)
    }

    /// Database string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Voided => "voided",
        }
    }

    /// Parse from the database string representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "voided" => Some(Self::Voided),
            _ => None,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
