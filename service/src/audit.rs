//! Audit lifecycle: approve, reject, void and resend.
//!
//! The lifecycle of one ticket is a [`Reducer`]. [`AuditReducer`] applies the
//! transition table from `receipt_desk_core::audit` to an [`AuditState`] and
//! describes the void notice as an effect; [`AuditLifecycle`] loads the
//! ticket, persists the new state with a status-guarded update and only then
//! runs the effects.

use crate::dispatcher::NotificationDispatcher;
use crate::error::{ServiceError, ServiceResult};
use crate::messages;
use chrono::{DateTime, Utc};
use receipt_desk_core::audit::{AuditAction, AuditStatus, RESEND_AUDIT_NOTE, TransitionError};
use receipt_desk_core::datastore::{Datastore, PatchOutcome, TicketPatch};
use receipt_desk_core::effect::Effect;
use receipt_desk_core::environment::Clock;
use receipt_desk_core::reducer::Reducer;
use receipt_desk_core::types::{DeliveryStatus, Money, Ticket, TicketId};
use receipt_desk_core::{SmallVec, smallvec};
use receipt_desk_runtime::effects;
use receipt_desk_runtime::metrics::AuditMetrics;
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// The audit-relevant slice of a ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditState {
    /// Ticket ID
    pub ticket_id: TicketId,
    /// Zero-padded ticket number
    pub ticket_number: String,
    /// Amount paid
    pub amount: Money,
    /// Customer phone, if known
    pub customer_phone: Option<String>,
    /// Audit status
    pub status: AuditStatus,
    /// Notification outcome
    pub delivery_status: DeliveryStatus,
    /// Auditor who last acted
    pub audited_by: Option<String>,
    /// When the last audit action happened
    pub audited_at: Option<DateTime<Utc>>,
    /// Note attached to the last audit action
    pub audit_note: Option<String>,
    /// Why the last command was refused
    pub last_error: Option<TransitionError>,
}

impl AuditState {
    /// Project a stored ticket
    #[must_use]
    pub fn from_ticket(ticket: &Ticket) -> Self {
        Self {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
            amount: ticket.payment_amount,
            customer_phone: ticket.customer_phone.clone(),
            status: ticket.audit_status,
            delivery_status: ticket.delivery_status,
            audited_by: ticket.audited_by.clone(),
            audited_at: ticket.audited_at,
            audit_note: ticket.audit_note.clone(),
            last_error: None,
        }
    }

    /// Patch writing the fields `action` owns back to storage.
    ///
    /// Only a resend carries a new notification outcome; other actions leave
    /// the stored delivery status alone.
    #[must_use]
    pub fn patch(&self, action: AuditAction) -> TicketPatch {
        TicketPatch {
            delivery_status: (action == AuditAction::Resend).then_some(self.delivery_status),
            audit_status: Some(self.status),
            audited_by: Some(self.audited_by.clone()),
            audited_at: Some(self.audited_at),
            audit_note: Some(self.audit_note.clone()),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Commands accepted by [`AuditReducer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuditCommand {
    /// Confirm the payment
    Approve {
        /// Acting auditor
        auditor: String,
        /// Optional note
        note: Option<String>,
    },
    /// Send the ticket back to the agent
    Reject {
        /// Acting auditor
        auditor: String,
        /// Optional note
        note: Option<String>,
    },
    /// Cancel the ticket for good
    Void {
        /// Acting auditor
        auditor: String,
        /// Optional note, quoted to the customer
        note: Option<String>,
    },
    /// Put a rejected ticket back in the queue after re-notifying the customer
    Resend {
        /// Dispatcher verdict for the new notification
        delivered: bool,
    },
    /// Feedback from the void notice effect
    VoidNoticeSettled {
        /// Dispatcher verdict for the notice
        delivered: bool,
    },
}

impl AuditCommand {
    /// The lifecycle action this command performs
    #[must_use]
    pub const fn action(&self) -> Option<AuditAction> {
        match self {
            Self::Approve { .. } => Some(AuditAction::Approve),
            Self::Reject { .. } => Some(AuditAction::Reject),
            Self::Void { .. } => Some(AuditAction::Void),
            Self::Resend { .. } => Some(AuditAction::Resend),
            Self::VoidNoticeSettled { .. } => None,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of [`AuditReducer`].
#[derive(Clone)]
pub struct AuditEnvironment {
    /// Time source for `audited_at`
    pub clock: Arc<dyn Clock>,
    /// Sender for void notices; `None` disables them
    pub notifier: Option<NotificationDispatcher>,
}

impl AuditEnvironment {
    /// Create an environment
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, notifier: Option<NotificationDispatcher>) -> Self {
        Self { clock, notifier }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Pure audit lifecycle reducer.
///
/// A refused command leaves every field except `last_error` untouched and
/// produces no effects.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuditReducer;

impl AuditReducer {
    fn record(
        state: &mut AuditState,
        action: AuditAction,
        auditor: String,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        match state.status.apply(action) {
            Ok(next) => {
                state.status = next;
                state.audited_by = Some(auditor);
                state.audited_at = Some(now);
                state.audit_note = note;
                state.last_error = None;
                true
            }
            Err(err) => {
                state.last_error = Some(err);
                false
            }
        }
    }

    fn void_notice(state: &AuditState, env: &AuditEnvironment) -> Option<Effect<AuditCommand>> {
        let phone = state.customer_phone.clone()?;
        let notifier = env.notifier.clone()?;
        if !notifier.is_configured() {
            return None;
        }

        let body = messages::void_notice(
            &state.ticket_number,
            state.amount,
            state.audit_note.as_deref(),
        );
        Some(Effect::Future(Box::pin(async move {
            let outcome = notifier.dispatch(&phone, &body).await;
            Some(AuditCommand::VoidNoticeSettled {
                delivered: outcome.delivered,
            })
        })))
    }
}

impl Reducer for AuditReducer {
    type State = AuditState;
    type Action = AuditCommand;
    type Environment = AuditEnvironment;

    fn reduce(
        &self,
        state: &mut AuditState,
        action: AuditCommand,
        env: &AuditEnvironment,
    ) -> SmallVec<[Effect<AuditCommand>; 4]> {
        match action {
            AuditCommand::Approve { auditor, note } => {
                Self::record(state, AuditAction::Approve, auditor, note, env.clock.now());
                SmallVec::new()
            }
            AuditCommand::Reject { auditor, note } => {
                Self::record(state, AuditAction::Reject, auditor, note, env.clock.now());
                SmallVec::new()
            }
            AuditCommand::Void { auditor, note } => {
                if !Self::record(state, AuditAction::Void, auditor, note, env.clock.now()) {
                    return SmallVec::new();
                }
                match Self::void_notice(state, env) {
                    Some(effect) => smallvec![effect],
                    None => {
                        tracing::debug!(
                            ticket_id = %state.ticket_id,
                            "No void notice: missing phone or gateway"
                        );
                        SmallVec::new()
                    }
                }
            }
            AuditCommand::Resend { delivered } => {
                match state.status.apply(AuditAction::Resend) {
                    Ok(next) => {
                        state.status = next;
                        state.delivery_status = DeliveryStatus::from_delivered(delivered);
                        state.audited_by = None;
                        state.audited_at = None;
                        state.audit_note = Some(RESEND_AUDIT_NOTE.to_string());
                        state.last_error = None;
                    }
                    Err(err) => state.last_error = Some(err),
                }
                SmallVec::new()
            }
            AuditCommand::VoidNoticeSettled { delivered } => {
                if delivered {
                    tracing::info!(ticket_id = %state.ticket_id, "Void notice sent");
                } else {
                    tracing::warn!(ticket_id = %state.ticket_id, "Void notice not delivered");
                }
                SmallVec::new()
            }
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// Runs audit commands against stored tickets.
#[derive(Clone)]
pub struct AuditLifecycle {
    store: Arc<dyn Datastore>,
    dispatcher: NotificationDispatcher,
    env: AuditEnvironment,
    receipt_base_url: String,
}

impl AuditLifecycle {
    /// Create the lifecycle service
    #[must_use]
    pub fn new(
        store: Arc<dyn Datastore>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        receipt_base_url: impl Into<String>,
    ) -> Self {
        let env = AuditEnvironment::new(clock, Some(dispatcher.clone()));
        Self {
            store,
            dispatcher,
            env,
            receipt_base_url: receipt_base_url.into(),
        }
    }

    /// Approve a ticket.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] without an auditor name
    /// - [`ServiceError::TicketNotFound`] for unknown ids
    /// - [`ServiceError::InvalidTransition`] if the current status forbids it
    /// - [`ServiceError::PersistenceFailed`] on storage errors
    #[tracing::instrument(skip(self, note))]
    pub async fn approve(
        &self,
        ticket_id: TicketId,
        auditor: &str,
        note: Option<&str>,
    ) -> ServiceResult<Ticket> {
        let (auditor, note) = audit_input(auditor, note)?;
        self.run(ticket_id, AuditCommand::Approve { auditor, note })
            .await
    }

    /// Reject a ticket.
    ///
    /// # Errors
    ///
    /// Same as [`Self::approve`].
    #[tracing::instrument(skip(self, note))]
    pub async fn reject(
        &self,
        ticket_id: TicketId,
        auditor: &str,
        note: Option<&str>,
    ) -> ServiceResult<Ticket> {
        let (auditor, note) = audit_input(auditor, note)?;
        self.run(ticket_id, AuditCommand::Reject { auditor, note })
            .await
    }

    /// Void a ticket and, best effort, tell the customer.
    ///
    /// The notice never affects the result.
    ///
    /// # Errors
    ///
    /// Same as [`Self::approve`].
    #[tracing::instrument(skip(self, note))]
    pub async fn void(
        &self,
        ticket_id: TicketId,
        auditor: &str,
        note: Option<&str>,
    ) -> ServiceResult<Ticket> {
        let (auditor, note) = audit_input(auditor, note)?;
        self.run(ticket_id, AuditCommand::Void { auditor, note })
            .await
    }

    /// Re-notify the customer about a rejected ticket and return it to the queue.
    ///
    /// Nothing is sent unless the ticket is currently rejected.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::TicketNotFound`] for unknown ids
    /// - [`ServiceError::InvalidTransition`] unless the ticket is rejected
    /// - [`ServiceError::PersistenceFailed`] on storage errors
    #[tracing::instrument(skip(self))]
    pub async fn resend(&self, ticket_id: TicketId) -> ServiceResult<Ticket> {
        let ticket = self.load(ticket_id).await?;
        if let Err(err) = ticket.audit_status.apply(AuditAction::Resend) {
            AuditMetrics::record_rejection(AuditAction::Resend.as_str());
            tracing::info!(error = %err, "Resend refused");
            return Err(err.into());
        }

        let delivered = match &ticket.customer_phone {
            Some(phone) => {
                let body = messages::issuance_message_for(&ticket, &self.receipt_base_url);
                self.dispatcher.dispatch(phone, &body).await.delivered
            }
            None => {
                tracing::warn!("Ticket has no customer phone, resend notification skipped");
                false
            }
        };

        self.apply(ticket, AuditCommand::Resend { delivered }).await
    }

    async fn run(&self, ticket_id: TicketId, command: AuditCommand) -> ServiceResult<Ticket> {
        let ticket = self.load(ticket_id).await?;
        self.apply(ticket, command).await
    }

    async fn load(&self, ticket_id: TicketId) -> ServiceResult<Ticket> {
        self.store
            .find_ticket_by_id(ticket_id)
            .await?
            .ok_or(ServiceError::TicketNotFound(ticket_id))
    }

    async fn apply(&self, ticket: Ticket, command: AuditCommand) -> ServiceResult<Ticket> {
        let Some(action) = command.action() else {
            return Err(ServiceError::Validation(
                "feedback commands cannot be submitted".into(),
            ));
        };

        let mut state = AuditState::from_ticket(&ticket);
        let pending_effects = AuditReducer.reduce(&mut state, command, &self.env);

        if let Some(err) = state.last_error {
            AuditMetrics::record_rejection(action.as_str());
            tracing::info!(action = action.as_str(), error = %err, "Audit action refused");
            return Err(err.into());
        }

        let patch = state.patch(action);
        let updated = match self
            .store
            .update_ticket_fields(ticket.id, Some(ticket.audit_status), &patch)
            .await?
        {
            PatchOutcome::Applied(updated) => *updated,
            PatchOutcome::NotFound => return Err(ServiceError::TicketNotFound(ticket.id)),
            PatchOutcome::StatusChanged { actual } => {
                AuditMetrics::record_rejection(action.as_str());
                tracing::info!(
                    action = action.as_str(),
                    expected = %ticket.audit_status,
                    actual = %actual,
                    "Audit action lost a race with another writer"
                );
                let err = match actual.apply(action) {
                    Err(err) => err,
                    Ok(_) => TransitionError::ConcurrentUpdate { current: actual },
                };
                return Err(err.into());
            }
        };

        AuditMetrics::record_action(action.as_str());
        tracing::info!(
            action = action.as_str(),
            from = %ticket.audit_status,
            to = %updated.audit_status,
            "Audit action applied"
        );

        for feedback in effects::execute(pending_effects).await {
            AuditReducer.reduce(&mut state, feedback, &self.env);
        }

        Ok(updated)
    }
}

fn audit_input(auditor: &str, note: Option<&str>) -> ServiceResult<(String, Option<String>)> {
    let auditor = auditor.trim();
    if auditor.is_empty() {
        return Err(ServiceError::Validation("auditor name is required".into()));
    }
    let note = note
        .map(str::trim)
        .filter(|note| !note.is_empty())
        .map(str::to_string);
    Ok((auditor.to_string(), note))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{DEFAULT_SEND_BUDGET, UnresolvedDeliveryPolicy};
    use receipt_desk_testing::reducer_test::assertions;
    use receipt_desk_testing::{ReducerTest, ScriptedGateway, ScriptedReply, fixtures, test_clock};

    fn env(gateway: &ScriptedGateway) -> AuditEnvironment {
        let notifier = NotificationDispatcher::new(
            Arc::new(gateway.clone()),
            DEFAULT_SEND_BUDGET,
            UnresolvedDeliveryPolicy::AssumeDelivered,
        );
        AuditEnvironment::new(Arc::new(test_clock()), Some(notifier))
    }

    fn state(status: AuditStatus) -> AuditState {
        let agent = fixtures::issuing_agent("Amina", 1, 10);
        let customer = fixtures::customer("Jo", "+255700000001");
        let mut ticket = fixtures::ticket(&agent, &customer, 1);
        ticket.audit_status = status;
        AuditState::from_ticket(&ticket)
    }

    #[test]
    fn test_approve_records_auditor() {
        ReducerTest::new(AuditReducer)
            .with_env(env(&ScriptedGateway::new()))
            .given_state(state(AuditStatus::Pending))
            .when_action(AuditCommand::Approve {
                auditor: "Grace".into(),
                note: Some("ok".into()),
            })
            .then_state(|state| {
                assert_eq!(state.status, AuditStatus::Approved);
                assert_eq!(state.audited_by.as_deref(), Some("Grace"));
                assert_eq!(state.audited_at, Some(test_clock().now()));
                assert_eq!(state.audit_note.as_deref(), Some("ok"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_refused_command_only_sets_last_error() {
        let before = state(AuditStatus::Voided);
        let expected = before.clone();

        ReducerTest::new(AuditReducer)
            .with_env(env(&ScriptedGateway::new()))
            .given_state(before)
            .when_action(AuditCommand::Reject {
                auditor: "Grace".into(),
                note: None,
            })
            .then_state(move |state| {
                assert_eq!(
                    state.last_error,
                    Some(TransitionError::Voided {
                        action: AuditAction::Reject
                    })
                );
                assert_eq!(
                    AuditState {
                        last_error: None,
                        ..state.clone()
                    },
                    expected
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_void_emits_notice_effect() {
        ReducerTest::new(AuditReducer)
            .with_env(env(&ScriptedGateway::new()))
            .given_state(state(AuditStatus::Approved))
            .when_action(AuditCommand::Void {
                auditor: "Grace".into(),
                note: Some("duplicate".into()),
            })
            .then_state(|state| assert_eq!(state.status, AuditStatus::Voided))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_void_without_phone_or_gateway_has_no_effect() {
        let mut no_phone = state(AuditStatus::Pending);
        no_phone.customer_phone = None;

        ReducerTest::new(AuditReducer)
            .with_env(env(&ScriptedGateway::new()))
            .given_state(no_phone)
            .when_action(AuditCommand::Void {
                auditor: "Grace".into(),
                note: None,
            })
            .then_effects(assertions::assert_no_effects)
            .run();

        ReducerTest::new(AuditReducer)
            .with_env(env(&ScriptedGateway::unconfigured()))
            .given_state(state(AuditStatus::Pending))
            .when_action(AuditCommand::Void {
                auditor: "Grace".into(),
                note: None,
            })
            .then_state(|state| assert_eq!(state.status, AuditStatus::Voided))
            .then_effects(assertions::assert_no_effects)
            .then_feedback(assertions::assert_no_feedback)
            .run();
    }

    #[test]
    fn test_resend_clears_audit_fields() {
        let mut rejected = state(AuditStatus::Rejected);
        rejected.audited_by = Some("Grace".into());
        rejected.audited_at = Some(test_clock().now());
        rejected.audit_note = Some("bad photo".into());

        ReducerTest::new(AuditReducer)
            .with_env(env(&ScriptedGateway::new()))
            .given_state(rejected)
            .when_action(AuditCommand::Resend { delivered: false })
            .then_state(|state| {
                assert_eq!(state.status, AuditStatus::Pending);
                assert_eq!(state.audited_by, None);
                assert_eq!(state.audited_at, None);
                assert_eq!(state.audit_note.as_deref(), Some(RESEND_AUDIT_NOTE));
                assert_eq!(state.delivery_status, DeliveryStatus::Failed);
            })
            .run();
    }

    #[test]
    fn test_void_notice_settles_with_dispatch_verdict() {
        let gateway = ScriptedGateway::new();

        ReducerTest::new(AuditReducer)
            .with_env(env(&gateway))
            .given_state(state(AuditStatus::Pending))
            .when_action(AuditCommand::Void {
                auditor: "Grace".into(),
                note: None,
            })
            .then_feedback(|actions| {
                assert_eq!(actions, [AuditCommand::VoidNoticeSettled { delivered: true }]);
            })
            .run();

        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.ends_with("Reason: no reason provided"));

        ReducerTest::new(AuditReducer)
            .with_env(env(&ScriptedGateway::answering(ScriptedReply::refuse("off"))))
            .given_state(state(AuditStatus::Rejected))
            .when_action(AuditCommand::Void {
                auditor: "Grace".into(),
                note: Some("duplicate".into()),
            })
            .then_feedback(|actions| {
                assert_eq!(actions, [AuditCommand::VoidNoticeSettled { delivered: false }]);
            })
            .run();
    }

    #[test]
    fn test_approve_reject_void_leave_delivery_status_alone() {
        let voided = AuditState {
            status: AuditStatus::Voided,
            ..state(AuditStatus::Pending)
        };
        for action in [AuditAction::Approve, AuditAction::Reject, AuditAction::Void] {
            let patch = voided.patch(action);
            assert_eq!(patch.delivery_status, None, "{action:?}");
            assert_eq!(patch.audit_status, Some(AuditStatus::Voided));
        }

        let resent = AuditState {
            delivery_status: DeliveryStatus::Sent,
            ..state(AuditStatus::Pending)
        };
        assert_eq!(
            resent.patch(AuditAction::Resend).delivery_status,
            Some(DeliveryStatus::Sent)
        );
    }

    #[test]
    fn test_audit_input_validation() {
        assert!(audit_input("  ", None).is_err());
        assert_eq!(
            audit_input(" Grace ", Some("  ")).ok(),
            Some(("Grace".to_string(), None))
        );
    }
}
