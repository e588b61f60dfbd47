//! Bounded notification dispatch.
//!
//! Turns whatever the SMS gateway does (answer, fail, hang) into a definite
//! "treat as delivered" verdict within a fixed budget. The dispatcher never
//! returns an error.
//!
//! # Resolution rules
//!
//! | Gateway behaviour within the budget         | Verdict          |
//! |---------------------------------------------|------------------|
//! | reports success                             | delivered        |
//! | reports failure but returns a provider id   | delivered        |
//! | reports failure without a provider id       | not delivered    |
//! | errors, or does not answer in time          | per [`UnresolvedDeliveryPolicy`] |
//! | gateway has no credentials                  | not delivered, no call made |

use receipt_desk_core::notification::{GatewayReceipt, NotificationGateway};
use receipt_desk_runtime::metrics::NotificationMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default time budget for one send
pub const DEFAULT_SEND_BUDGET: Duration = Duration::from_secs(30);

/// How to classify a send whose outcome is unknown (timeout or gateway error).
///
/// Providers deliver asynchronously, so a missing answer does not prove the
/// message was lost. Production wiring uses [`Self::AssumeDelivered`]; the
/// price is that a genuinely lost message can be recorded as sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnresolvedDeliveryPolicy {
    /// Record unknown outcomes as sent
    AssumeDelivered,
    /// Record unknown outcomes as failed
    AssumeFailed,
}

impl UnresolvedDeliveryPolicy {
    const fn verdict(self) -> bool {
        matches!(self, Self::AssumeDelivered)
    }
}

/// How a dispatch was settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Provider reported success
    Delivered,
    /// Provider reported failure but assigned a message id
    ProviderAccepted(String),
    /// Provider refused the message
    Rejected(Option<String>),
    /// No answer within the budget
    TimedOut,
    /// The gateway call failed
    GatewayError(String),
    /// No credentials; nothing was sent
    Unconfigured,
}

impl Resolution {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::ProviderAccepted(_) => "provider_accepted",
            Self::Rejected(_) => "rejected",
            Self::TimedOut => "timed_out",
            Self::GatewayError(_) => "gateway_error",
            Self::Unconfigured => "unconfigured",
        }
    }

    fn from_receipt(receipt: GatewayReceipt) -> Self {
        match receipt {
            GatewayReceipt {
                delivered: true, ..
            } => Self::Delivered,
            GatewayReceipt {
                provider_id: Some(id),
                ..
            } => Self::ProviderAccepted(id),
            GatewayReceipt { error, .. } => Self::Rejected(error),
        }
    }
}

/// Result of one dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Whether the message is treated as delivered
    pub delivered: bool,
    /// What actually happened
    pub resolution: Resolution,
}

/// Sends notifications with a time budget and a named policy for unknown outcomes.
#[derive(Clone)]
pub struct NotificationDispatcher {
    gateway: Arc<dyn NotificationGateway>,
    budget: Duration,
    policy: UnresolvedDeliveryPolicy,
}

impl NotificationDispatcher {
    /// Create a dispatcher
    #[must_use]
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        budget: Duration,
        policy: UnresolvedDeliveryPolicy,
    ) -> Self {
        Self {
            gateway,
            budget,
            policy,
        }
    }

    /// Whether the underlying gateway has credentials
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.gateway.is_configured()
    }

    /// The policy applied to unknown outcomes
    #[must_use]
    pub const fn policy(&self) -> UnresolvedDeliveryPolicy {
        self.policy
    }

    /// Send `body` to `phone_number` and settle on a verdict.
    ///
    /// The gateway call runs as its own task. If the budget elapses first the
    /// task is left running and its eventual answer is only logged.
    #[tracing::instrument(skip(self, body))]
    pub async fn dispatch(&self, phone_number: &str, body: &str) -> DispatchOutcome {
        if !self.gateway.is_configured() {
            tracing::info!("Notification gateway not configured, skipping send");
            NotificationMetrics::record_dispatch(Resolution::Unconfigured.label(), Duration::ZERO);
            return DispatchOutcome {
                delivered: false,
                resolution: Resolution::Unconfigured,
            };
        }

        let started = Instant::now();
        let send = self.gateway.send(phone_number.to_string(), body.to_string());
        let mut call = tokio::spawn(send);

        let resolution = match tokio::time::timeout(self.budget, &mut call).await {
            Ok(Ok(Ok(receipt))) => Resolution::from_receipt(receipt),
            Ok(Ok(Err(err))) => Resolution::GatewayError(err.to_string()),
            Ok(Err(join_err)) => Resolution::GatewayError(format!("send task failed: {join_err}")),
            Err(_) => {
                tokio::spawn(async move {
                    match call.await {
                        Ok(Ok(receipt)) => tracing::info!(
                            delivered = receipt.delivered,
                            provider_id = ?receipt.provider_id,
                            "Late gateway answer discarded"
                        ),
                        Ok(Err(err)) => {
                            tracing::info!(error = %err, "Late gateway error discarded");
                        }
                        Err(err) => tracing::warn!(error = %err, "Detached send task failed"),
                    }
                });
                Resolution::TimedOut
            }
        };

        let delivered = match &resolution {
            Resolution::Delivered | Resolution::ProviderAccepted(_) => true,
            Resolution::Rejected(_) | Resolution::Unconfigured => false,
            Resolution::TimedOut | Resolution::GatewayError(_) => self.policy.verdict(),
        };

        NotificationMetrics::record_dispatch(resolution.label(), started.elapsed());
        match &resolution {
            Resolution::Delivered | Resolution::ProviderAccepted(_) => {
                tracing::info!(resolution = resolution.label(), delivered, "Notification sent");
            }
            other => tracing::warn!(
                resolution = other.label(),
                detail = ?other,
                delivered,
                "Notification outcome uncertain or failed"
            ),
        }

        DispatchOutcome {
            delivered,
            resolution,
        }
    }
}
