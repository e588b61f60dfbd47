//! # Receipt Desk Testing
//!
//! Testing utilities and helpers for the receipt desk.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - An in-memory [`Datastore`](receipt_desk_core::datastore::Datastore) with fault injection
//! - A scripted notification gateway
//! - Fixture builders and proptest strategies
//! - Assertion helpers for reducers
//!
//! ## Example
//!
//! ```ignore
//! use receipt_desk_testing::{InMemoryDatastore, ScriptedGateway, fixtures};
//!
//! #[tokio::test]
//! async fn test_issue_flow() {
//!     let store = InMemoryDatastore::new();
//!     store.insert_agent(fixtures::issuing_agent("Amina", 100, 102));
//!     store.insert_customer(fixtures::customer("Jo", "+255700000001"));
//!
//!     let service = test_service(store.clone(), ScriptedGateway::new());
//!     let ticket = service.issue_ticket(request()).await.unwrap();
//!     assert_eq!(ticket.ticket_number, "000100");
//! }
//! ```

use chrono::{DateTime, Utc};
use receipt_desk_core::environment::Clock;

/// In-memory datastore
pub mod datastore;

/// Scripted notification gateway
pub mod gateway;


/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use receipt_desk_core::receipt::{ReceiptFields, ReceiptRenderer, RenderError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use receipt_desk_testing::mocks::FixedClock;
    /// use receipt_desk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Renderer that always fails
    #[derive(Debug, Clone, Default)]
    pub struct FailingRenderer;

    impl ReceiptRenderer for FailingRenderer {
        fn render(&self, _fields: &ReceiptFields) -> Result<String, RenderError> {
            Err(RenderError("template missing".to_string()))
        }
    }
}

/// Fixture builders for domain entities.
pub mod fixtures {
    use super::Clock;
    use receipt_desk_core::audit::AuditStatus;
    use receipt_desk_core::types::{
        Agent, AgentId, Customer, CustomerId, DeliveryStatus, Money, PaymentMode, StaffRole,
        Ticket, TicketId, TicketNumber,
    };

    /// Active issuing agent with a fresh counter
    #[must_use]
    pub fn issuing_agent(name: &str, range_start: i64, range_end: i64) -> Agent {
        Agent {
            id: AgentId::new(),
            name: name.to_string(),
            role: StaffRole::IssuingAgent,
            range_start: Some(range_start),
            range_end: Some(range_end),
            current_number: None,
            is_active: true,
        }
    }

    /// Active auditor account
    #[must_use]
    pub fn auditor(name: &str) -> Agent {
        Agent {
            id: AgentId::new(),
            name: name.to_string(),
            role: StaffRole::Auditor,
            range_start: None,
            range_end: None,
            current_number: None,
            is_active: true,
        }
    }

    /// Active customer
    #[must_use]
    pub fn customer(name: &str, phone_number: &str) -> Customer {
        Customer {
            id: CustomerId::new(),
            name: name.to_string(),
            phone_number: phone_number.to_string(),
            is_active: true,
        }
    }

    /// Pending cash ticket for 500.00
    #[must_use]
    pub fn ticket(agent: &Agent, customer: &Customer, number: i64) -> Ticket {
        Ticket {
            id: TicketId::new(),
            customer_id: customer.id,
            customer_name: customer.name.clone(),
            customer_phone: Some(customer.phone_number.clone()),
            agent_id: agent.id,
            agent_name: agent.name.clone(),
            payment_amount: Money::from_units(500),
            payment_mode: PaymentMode::Cash,
            ticket_number: TicketNumber::new(number).formatted(),
            date: super::mocks::test_clock().now(),
            reason_for_payment: None,
            delivery_status: DeliveryStatus::Sent,
            audit_status: AuditStatus::Pending,
            audited_by: None,
            audited_at: None,
            audit_note: None,
            receipt_html: "<html></html>".to_string(),
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use receipt_desk_core::audit::AuditAction;

    /// Any audit action
    pub fn any_audit_action() -> impl Strategy<Value = AuditAction> {
        prop_oneof![
            Just(AuditAction::Approve),
            Just(AuditAction::Reject),
            Just(AuditAction::Void),
            Just(AuditAction::Resend),
        ]
    }
}

// Re-export commonly used items
pub use datastore::InMemoryDatastore;
pub use gateway::{ScriptedGateway, ScriptedReply, SentMessage};
pub use mocks::{FailingRenderer, FixedClock, test_clock};
pub use reducer_test::ReducerTest;
