//! Service-level errors and the response envelope.
//!
//! Every produced operation returns `Result<T, ServiceError>`. Callers that
//! need the "success flag plus payload or message" shape convert it with
//! [`ServiceResponse::from`].

use receipt_desk_core::audit::TransitionError;
use receipt_desk_core::datastore::DatastoreError;
use receipt_desk_core::receipt::RenderError;
use receipt_desk_core::types::TicketId;
use serde::Serialize;
use thiserror::Error;

/// Errors reported by the ticket workflows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The request itself is malformed
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No customer owns this phone number
    #[error("No customer is registered with phone number {phone_number}")]
    CustomerNotRegistered {
        /// Phone number that was looked up
        phone_number: String,
    },

    /// The customer exists but may not receive tickets
    #[error("Customer {name} is inactive")]
    CustomerInactive {
        /// Customer display name
        name: String,
    },

    /// Unknown or inactive issuing agent
    #[error("Invalid agent: {0}")]
    InvalidAgent(String),

    /// The agent has no ticket number range
    #[error("Agent {agent} has no ticket number range configured")]
    NotConfigured {
        /// Agent display name
        agent: String,
    },

    /// The agent's range is used up
    #[error("Agent {agent} has used every ticket number up to {range_end}")]
    RangeExhausted {
        /// Agent display name
        agent: String,
        /// Last number of the range
        range_end: i64,
    },

    /// Storage failed after retries, or with a non-retryable error
    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    /// No ticket with this id
    #[error("Ticket {0} not found")]
    TicketNotFound(TicketId),

    /// The audit state machine refused the action
    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    /// The receipt document could not be rendered
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ServiceError {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::CustomerNotRegistered { .. } => "NOT_REGISTERED",
            Self::CustomerInactive { .. } => "INACTIVE",
            Self::InvalidAgent(_) => "INVALID_AGENT",
            Self::NotConfigured { .. } => "NOT_CONFIGURED",
            Self::RangeExhausted { .. } => "RANGE_EXHAUSTED",
            Self::PersistenceFailed(_) => "PERSISTENCE_FAILED",
            Self::TicketNotFound(_) => "TICKET_NOT_FOUND",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::Render(_) => "RENDER_FAILED",
        }
    }

    /// Whether the caller asked for something the current data does not allow
    ///
    /// Precondition failures never have side effects.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::CustomerNotRegistered { .. }
                | Self::CustomerInactive { .. }
                | Self::InvalidAgent(_)
                | Self::NotConfigured { .. }
                | Self::RangeExhausted { .. }
                | Self::InvalidTransition(_)
        )
    }
}

impl From<DatastoreError> for ServiceError {
    fn from(err: DatastoreError) -> Self {
        Self::PersistenceFailed(err.to_string())
    }
}

/// Result alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Success flag plus either a payload or a short message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceResponse<T> {
    /// Whether the operation succeeded
    pub success: bool,
    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Human-readable failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Machine-readable failure code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T> ServiceResponse<T> {
    /// Successful response
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            code: None,
        }
    }

    /// Failed response
    #[must_use]
    pub fn failed(err: &ServiceError) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(err.to_string()),
            code: Some(err.code()),
        }
    }
}

impl<T> From<ServiceResult<T>> for ServiceResponse<T> {
    fn from(result: ServiceResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failed(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use receipt_desk_core::audit::AuditStatus;

    #[test]
    fn test_datastore_errors_become_persistence_failures() {
        let err: ServiceError = DatastoreError::Connection("reset".into()).into();
        assert_eq!(err.code(), "PERSISTENCE_FAILED");
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_envelope_carries_message_and_code() {
        let err = ServiceError::InvalidTransition(TransitionError::NotRejected {
            current: AuditStatus::Voided,
        });
        let response: ServiceResponse<()> = Err(err).into();

        assert!(!response.success);
        assert_eq!(response.code, Some("INVALID_TRANSITION"));
        assert!(response.message.is_some());
        assert!(response.data.is_none());
    }

    #[test]
    fn test_envelope_serializes_without_empty_fields() {
        let response = ServiceResponse::ok(42);
        let json = serde_json::to_value(&response).unwrap_or_default();
        assert_eq!(json, serde_json::json!({ "success": true, "data": 42 }));
    }
}
