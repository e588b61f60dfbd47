//! Audit lifecycle and resend tests through [`TicketService`].

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use receipt_desk_core::audit::{AuditAction, AuditStatus, RESEND_AUDIT_NOTE, TransitionError};
use receipt_desk_core::datastore::TicketPatch;
use receipt_desk_core::types::{DeliveryStatus, Money, PaymentMode, Ticket, TicketId};
use receipt_desk_service::messages::HtmlReceiptRenderer;
use receipt_desk_service::{IssueTicketRequest, ServiceError, ServiceSettings, TicketService};
use receipt_desk_testing::properties::any_audit_action;
use receipt_desk_testing::{
    InMemoryDatastore, ScriptedGateway, ScriptedReply, fixtures, test_clock,
};
use std::sync::Arc;

const PHONE: &str = "+255700000001";

struct Desk {
    store: InMemoryDatastore,
    gateway: ScriptedGateway,
    service: TicketService,
}

impl Desk {
    fn new(gateway: ScriptedGateway) -> Self {
        let store = InMemoryDatastore::new();
        store.insert_agent(fixtures::issuing_agent("Amina", 1, 10));
        store.insert_customer(fixtures::customer("Jo", PHONE));
        let service = TicketService::new(
            Arc::new(store.clone()),
            Arc::new(gateway.clone()),
            Arc::new(HtmlReceiptRenderer),
            Arc::new(test_clock()),
            &ServiceSettings::default(),
        );
        Self {
            store,
            gateway,
            service,
        }
    }

    async fn issue(&self) -> Ticket {
        self.service
            .issue_ticket(IssueTicketRequest {
                customer_phone: PHONE.to_string(),
                agent_name: "Amina".to_string(),
                amount: Money::from_units(500),
                payment_mode: PaymentMode::Cash,
                reason_for_payment: None,
            })
            .await
            .unwrap()
            .ticket
    }

    async fn act(&self, id: TicketId, action: AuditAction) -> Result<Ticket, ServiceError> {
        match action {
            AuditAction::Approve => self.service.approve_ticket(id, "Grace", None).await,
            AuditAction::Reject => self.service.reject_ticket(id, "Grace", None).await,
            AuditAction::Void => self.service.void_ticket(id, "Grace", None).await,
            AuditAction::Resend => self.service.resend_ticket(id).await,
        }
    }

    /// Move a fresh ticket into `status`
    async fn ticket_in(&self, status: AuditStatus) -> Ticket {
        let ticket = self.issue().await;
        let action = match status {
            AuditStatus::Pending => return ticket,
            AuditStatus::Approved => AuditAction::Approve,
            AuditStatus::Rejected => AuditAction::Reject,
            AuditStatus::Voided => AuditAction::Void,
        };
        self.act(ticket.id, action).await.unwrap()
    }
}

#[tokio::test]
async fn test_reject_then_resend_returns_ticket_to_queue() {
    let desk = Desk::new(ScriptedGateway::new());
    let ticket = desk.issue().await;
    assert_eq!(ticket.ticket_number, "000001");
    assert_eq!(ticket.audit_status, AuditStatus::Pending);

    let rejected = desk
        .service
        .reject_ticket(ticket.id, "Grace", Some("bad photo"))
        .await
        .unwrap();
    assert_eq!(rejected.audit_status, AuditStatus::Rejected);
    assert_eq!(rejected.audited_by.as_deref(), Some("Grace"));
    assert_eq!(rejected.audited_at, Some(ticket.date));
    assert_eq!(rejected.audit_note.as_deref(), Some("bad photo"));

    let resent = desk.service.resend_ticket(ticket.id).await.unwrap();
    assert_eq!(resent.audit_status, AuditStatus::Pending);
    assert_eq!(resent.audited_by, None);
    assert_eq!(resent.audited_at, None);
    assert_eq!(resent.audit_note.as_deref(), Some(RESEND_AUDIT_NOTE));
    assert_eq!(resent.delivery_status, DeliveryStatus::Sent);

    let sent = desk.gateway.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].body, sent[1].body);
    assert_eq!(desk.store.ticket(ticket.id).unwrap(), resent);
}

#[tokio::test]
async fn test_failed_resend_delivery_still_requeues() {
    let gateway = ScriptedGateway::new().then_reply(ScriptedReply::deliver());
    let desk = Desk::new(gateway.then_reply(ScriptedReply::refuse("switched off")));
    let ticket = desk.ticket_in(AuditStatus::Rejected).await;

    let resent = desk.service.resend_ticket(ticket.id).await.unwrap();

    assert_eq!(resent.audit_status, AuditStatus::Pending);
    assert_eq!(resent.delivery_status, DeliveryStatus::Failed);
}

#[tokio::test]
async fn test_resend_is_refused_unless_rejected() {
    let desk = Desk::new(ScriptedGateway::new());

    for status in [AuditStatus::Pending, AuditStatus::Approved, AuditStatus::Voided] {
        let ticket = desk.ticket_in(status).await;
        let before = desk.gateway.send_count();

        let err = desk.service.resend_ticket(ticket.id).await.unwrap_err();

        assert!(matches!(err, ServiceError::InvalidTransition(_)), "{status}");
        assert_eq!(desk.gateway.send_count(), before, "no SMS for {status}");
        assert_eq!(desk.store.ticket(ticket.id).unwrap().audit_status, status);
    }
}

#[tokio::test]
async fn test_void_is_allowed_from_every_live_status() {
    let desk = Desk::new(ScriptedGateway::new());

    for status in [AuditStatus::Pending, AuditStatus::Approved, AuditStatus::Rejected] {
        let ticket = desk.ticket_in(status).await;
        let voided = desk
            .service
            .void_ticket(ticket.id, "Grace", Some("duplicate payment"))
            .await
            .unwrap();
        assert_eq!(voided.audit_status, AuditStatus::Voided, "from {status}");
        assert_eq!(voided.audit_note.as_deref(), Some("duplicate payment"));
    }
}

#[tokio::test]
async fn test_void_notifies_customer() {
    let desk = Desk::new(ScriptedGateway::new());
    let ticket = desk.issue().await;

    desk.service
        .void_ticket(ticket.id, "Grace", Some("duplicate payment"))
        .await
        .unwrap();

    let sent = desk.gateway.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].phone_number, PHONE);
    assert_eq!(
        sent[1].body,
        "Receipt No 000001 for 500.00 has been voided. Reason: duplicate payment"
    );
}

#[tokio::test]
async fn test_void_notice_failure_does_not_undo_void() {
    let gateway = ScriptedGateway::new()
        .then_reply(ScriptedReply::deliver())
        .then_reply(ScriptedReply::refuse("network"));
    let desk = Desk::new(gateway);
    let ticket = desk.issue().await;

    let voided = desk.service.void_ticket(ticket.id, "Grace", None).await.unwrap();

    assert_eq!(voided.audit_status, AuditStatus::Voided);
    assert_eq!(
        desk.store.ticket(ticket.id).unwrap().audit_status,
        AuditStatus::Voided
    );
}

#[tokio::test]
async fn test_voided_ticket_is_terminal() {
    let desk = Desk::new(ScriptedGateway::new());
    let ticket = desk.ticket_in(AuditStatus::Voided).await;
    let before = desk.store.ticket(ticket.id).unwrap();

    for action in [
        AuditAction::Approve,
        AuditAction::Reject,
        AuditAction::Void,
        AuditAction::Resend,
    ] {
        let err = desk.act(ticket.id, action).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION", "{action:?}");
    }
    assert_eq!(desk.store.ticket(ticket.id).unwrap(), before);
}

#[tokio::test]
async fn test_already_approved_ticket_cannot_be_approved_again() {
    let desk = Desk::new(ScriptedGateway::new());
    let ticket = desk.ticket_in(AuditStatus::Approved).await;

    let err = desk
        .service
        .approve_ticket(ticket.id, "Grace", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("approved"));

    let err = desk
        .service
        .reject_ticket(ticket.id, "Grace", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_rejected_ticket_can_be_reaudited() {
    let desk = Desk::new(ScriptedGateway::new());
    let ticket = desk.ticket_in(AuditStatus::Rejected).await;

    let approved = desk
        .service
        .approve_ticket(ticket.id, "Grace", Some("photo fine after all"))
        .await
        .unwrap();
    assert_eq!(approved.audit_status, AuditStatus::Approved);
}

#[tokio::test]
async fn test_unknown_ticket_is_not_found() {
    let desk = Desk::new(ScriptedGateway::new());
    let id = TicketId::new();

    for action in [AuditAction::Approve, AuditAction::Void, AuditAction::Resend] {
        let err = desk.act(id, action).await.unwrap_err();
        assert!(matches!(err, ServiceError::TicketNotFound(missing) if missing == id));
    }
    assert_eq!(desk.gateway.send_count(), 0);
}

#[tokio::test]
async fn test_auditor_name_is_required() {
    let desk = Desk::new(ScriptedGateway::new());
    let ticket = desk.issue().await;

    let err = desk
        .service
        .approve_ticket(ticket.id, "   ", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(
        desk.store.ticket(ticket.id).unwrap().audit_status,
        AuditStatus::Pending
    );
}

/// Stored Pending ticket whose SMS outcome is still the `Failed` placeholder
fn seed_unsettled_ticket(desk: &Desk) -> Ticket {
    let agent = fixtures::issuing_agent("Baraka", 1, 10);
    let customer = fixtures::customer("Jo", PHONE);
    let mut ticket = fixtures::ticket(&agent, &customer, 1);
    ticket.delivery_status = DeliveryStatus::Failed;
    desk.store.insert_ticket(ticket.clone());
    ticket
}

#[tokio::test]
async fn test_audit_keeps_delivery_outcome_recorded_meanwhile() {
    let desk = Desk::new(ScriptedGateway::new());

    for action in [AuditAction::Approve, AuditAction::Reject, AuditAction::Void] {
        let ticket = seed_unsettled_ticket(&desk);
        // Issuance records the SMS outcome while the auditor is acting
        desk.store.simulate_concurrent_patch(ticket.id, TicketPatch::delivery(DeliveryStatus::Sent));

        let audited = desk.act(ticket.id, action).await.unwrap();

        let stored = desk.store.ticket(ticket.id).unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Sent, "{action:?}");
        assert_eq!(stored.audit_status, audited.audit_status);
        assert_eq!(audited.delivery_status, DeliveryStatus::Sent);
    }
}

#[tokio::test]
async fn test_concurrent_void_wins_over_approval() {
    let desk = Desk::new(ScriptedGateway::new());
    let ticket = desk.issue().await;
    desk.store.simulate_concurrent_patch(
        ticket.id,
        TicketPatch {
            audit_status: Some(AuditStatus::Voided),
            audited_by: Some(Some("Hassan".to_string())),
            ..TicketPatch::default()
        },
    );

    let err = desk
        .service
        .approve_ticket(ticket.id, "Grace", Some("looks fine"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::InvalidTransition(TransitionError::Voided {
            action: AuditAction::Approve
        })
    ));
    assert_eq!(err.code(), "INVALID_TRANSITION");
    let stored = desk.store.ticket(ticket.id).unwrap();
    assert_eq!(stored.audit_status, AuditStatus::Voided);
    assert_eq!(stored.audited_by.as_deref(), Some("Hassan"));
    assert_eq!(stored.audit_note, None);
}

#[tokio::test]
async fn test_concurrent_rejection_makes_approval_retryable() {
    let desk = Desk::new(ScriptedGateway::new());
    let ticket = desk.issue().await;
    desk.store.simulate_concurrent_patch(
        ticket.id,
        TicketPatch {
            audit_status: Some(AuditStatus::Rejected),
            ..TicketPatch::default()
        },
    );

    let err = desk
        .service
        .approve_ticket(ticket.id, "Grace", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::InvalidTransition(TransitionError::ConcurrentUpdate {
            current: AuditStatus::Rejected
        })
    ));
    assert_eq!(
        desk.store.ticket(ticket.id).unwrap().audit_status,
        AuditStatus::Rejected
    );

    let approved = desk
        .service
        .approve_ticket(ticket.id, "Grace", None)
        .await
        .unwrap();
    assert_eq!(approved.audit_status, AuditStatus::Approved);
}

#[tokio::test]
async fn test_void_during_resend_keeps_ticket_voided() {
    let desk = Desk::new(ScriptedGateway::new());
    let ticket = desk.ticket_in(AuditStatus::Rejected).await;
    desk.store.simulate_concurrent_patch(
        ticket.id,
        TicketPatch {
            audit_status: Some(AuditStatus::Voided),
            audited_by: Some(Some("Hassan".to_string())),
            ..TicketPatch::default()
        },
    );

    let err = desk.service.resend_ticket(ticket.id).await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::InvalidTransition(TransitionError::Voided {
            action: AuditAction::Resend
        })
    ));
    // The receipt SMS already went out; only the stored row is protected
    assert_eq!(desk.gateway.send_count(), 2);
    let stored = desk.store.ticket(ticket.id).unwrap();
    assert_eq!(stored.audit_status, AuditStatus::Voided);
    assert_eq!(stored.audited_by.as_deref(), Some("Hassan"));
    assert_ne!(stored.audit_note.as_deref(), Some(RESEND_AUDIT_NOTE));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_stored_status_follows_transition_table(
        actions in proptest::collection::vec(any_audit_action(), 1..8)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let desk = Desk::new(ScriptedGateway::new());
            let ticket = desk.issue().await;
            let mut model = AuditStatus::Pending;
            let mut expected_sms = 1;

            for action in actions {
                let result = desk.act(ticket.id, action).await;
                match model.apply(action) {
                    Ok(next) => {
                        prop_assert_eq!(result.unwrap().audit_status, next);
                        if matches!(action, AuditAction::Void | AuditAction::Resend) {
                            expected_sms += 1;
                        }
                        model = next;
                    }
                    Err(_) => prop_assert!(result.is_err()),
                }
                prop_assert_eq!(desk.store.ticket(ticket.id).unwrap().audit_status, model);
            }
            prop_assert_eq!(desk.gateway.send_count(), expected_sms);
            Ok(())
        })?;
    }
}
