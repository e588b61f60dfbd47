//! Notification gateway interface.
//!
//! Abstraction over SMS providers. A gateway may report success, a failure
//! with or without a provider message id, or reject the call outright.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Boxed, `'static` future returned by [`NotificationGateway::send`].
pub type GatewayFuture = Pin<Box<dyn Future<Output = GatewayResult<GatewayReceipt>> + Send>>;

/// Error raised when a send call fails before the provider answered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No credentials configured
    #[error("Notification gateway is not configured")]
    NotConfigured,

    /// Transport failure (DNS, TLS, connection reset, ...)
    #[error("Gateway transport error: {0}")]
    Transport(String),

    /// The provider answered with something unreadable
    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// What the provider reported for one message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GatewayReceipt {
    /// Provider's own success flag
    pub delivered: bool,
    /// Provider-assigned message id
    pub provider_id: Option<String>,
    /// Failure reason reported by the provider
    pub error: Option<String>,
}

impl GatewayReceipt {
    /// Receipt for an accepted message
    #[must_use]
    pub fn accepted(provider_id: impl Into<String>) -> Self {
        Self {
            delivered: true,
            provider_id: Some(provider_id.into()),
            error: None,
        }
    }

    /// Receipt for a refused message
    #[must_use]
    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            delivered: false,
            provider_id: None,
            error: Some(reason.into()),
        }
    }
}

/// SMS gateway trait.
pub trait NotificationGateway: Send + Sync {
    /// Whether credentials are present; checked before any network call.
    fn is_configured(&self) -> bool;

    /// Send a text message.
    ///
    /// The returned future owns its inputs so it can outlive the caller.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the provider could not be reached.
    fn send(&self, phone_number: String, body: String) -> GatewayFuture;
}
