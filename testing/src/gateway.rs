//! Scripted notification gateway.
//!
//! Replies are queued per test; every send is recorded at call time so tests
//! can assert on what the customer would have received even when the reply
//! never arrives.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use receipt_desk_core::notification::{
    GatewayError, GatewayFuture, GatewayReceipt, NotificationGateway,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the gateway answers one send.
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    /// Provider accepted the message
    Deliver {
        /// Provider message id
        provider_id: String,
    },
    /// Provider reported failure
    Refuse {
        /// Provider message id, if one was assigned anyway
        provider_id: Option<String>,
        /// Reported reason
        reason: String,
    },
    /// The call itself failed
    Fail(GatewayError),
    /// Never settles
    Hang,
    /// Wait, then answer
    After(Duration, Box<ScriptedReply>),
}

impl ScriptedReply {
    /// Accepted with a generated provider id
    #[must_use]
    pub fn deliver() -> Self {
        Self::Deliver {
            provider_id: "msg-1".to_string(),
        }
    }

    /// Refused without a provider id
    #[must_use]
    pub fn refuse(reason: impl Into<String>) -> Self {
        Self::Refuse {
            provider_id: None,
            reason: reason.into(),
        }
    }

    fn settle(self) -> GatewayFuture {
        Box::pin(async move {
            match self {
                Self::Deliver { provider_id } => Ok(GatewayReceipt::accepted(provider_id)),
                Self::Refuse {
                    provider_id,
                    reason,
                } => Ok(GatewayReceipt {
                    delivered: false,
                    provider_id,
                    error: Some(reason),
                }),
                Self::Fail(err) => Err(err),
                Self::Hang => std::future::pending::<Result<GatewayReceipt, GatewayError>>().await,
                Self::After(delay, reply) => {
                    tokio::time::sleep(delay).await;
                    reply.settle().await
                }
            }
        })
    }
}

/// A recorded outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    /// Destination phone number
    pub phone_number: String,
    /// Message body
    pub body: String,
}

#[derive(Debug)]
struct Script {
    replies: VecDeque<ScriptedReply>,
    fallback: ScriptedReply,
    sent: Vec<SentMessage>,
}

/// [`NotificationGateway`] driven by a queue of [`ScriptedReply`] values.
///
/// When the queue is empty every send gets the fallback reply (delivered by
/// default).
#[derive(Clone, Debug)]
pub struct ScriptedGateway {
    configured: bool,
    script: Arc<Mutex<Script>>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    /// A configured gateway that delivers everything
    #[must_use]
    pub fn new() -> Self {
        Self::answering(ScriptedReply::deliver())
    }

    /// A configured gateway that answers every send with `reply`
    #[must_use]
    pub fn answering(reply: ScriptedReply) -> Self {
        Self {
            configured: true,
            script: Arc::new(Mutex::new(Script {
                replies: VecDeque::new(),
                fallback: reply,
                sent: Vec::new(),
            })),
        }
    }

    /// A gateway without credentials
    #[must_use]
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Queue a reply for the next unanswered send
    #[must_use]
    pub fn then_reply(self, reply: ScriptedReply) -> Self {
        self.script.lock().unwrap().replies.push_back(reply);
        self
    }

    /// Messages sent so far
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.script.lock().unwrap().sent.clone()
    }

    /// Number of sends attempted
    #[must_use]
    pub fn send_count(&self) -> usize {
        self.script.lock().unwrap().sent.len()
    }
}

impl NotificationGateway for ScriptedGateway {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn send(&self, phone_number: String, body: String) -> GatewayFuture {
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.sent.push(SentMessage { phone_number, body });
            script
                .replies
                .pop_front()
                .unwrap_or_else(|| script.fallback.clone())
        };
        reply.settle()
    }
}
