//! Error type for web handlers.
//!
//! Bridges [`ServiceError`] to HTTP: picks the status code and writes the
//! same envelope successful calls use.

use crate::error::{ServiceError, ServiceResponse};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Handler error carrying a [`ServiceError`].
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl ApiError {
    /// HTTP status for the wrapped error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::TicketNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidTransition(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_)
            | ServiceError::CustomerNotRegistered { .. }
            | ServiceError::CustomerInactive { .. }
            | ServiceError::InvalidAgent(_)
            | ServiceError::NotConfigured { .. }
            | ServiceError::RangeExhausted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::PersistenceFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log internal errors
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                code = self.0.code(),
                error = %self.0,
                "Internal server error"
            );
        }

        (status, Json(ServiceResponse::<()>::failed(&self.0))).into_response()
    }
}
