//! Retrying [`Datastore`] decorator.
//!
//! Wraps any datastore and retries every call whose error is
//! connection-related, using a bounded linear backoff. Data errors (including
//! duplicate ticket numbers) propagate on the first attempt.

use receipt_desk_core::audit::AuditStatus;
use receipt_desk_core::datastore::{
    Datastore, DatastoreError, DatastoreFuture, PatchOutcome, TicketPatch,
};
use receipt_desk_core::types::{Agent, AgentId, Customer, CustomerHistoryEntry, Ticket, TicketId};
use receipt_desk_runtime::retry::{RetryPolicy, retry_with_predicate};
use std::sync::Arc;
use std::time::Duration;

/// Datastore that retries connection-class failures.
#[derive(Clone)]
pub struct RetryingDatastore {
    inner: Arc<dyn Datastore>,
    policy: RetryPolicy,
}

impl RetryingDatastore {
    /// Wrap `inner` with an explicit policy
    #[must_use]
    pub fn new(inner: Arc<dyn Datastore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Wrap `inner` with `max_attempts` attempts and a linear `step` backoff
    #[must_use]
    pub fn linear(inner: Arc<dyn Datastore>, max_attempts: usize, step: Duration) -> Self {
        let policy = RetryPolicy::builder()
            .max_attempts(max_attempts)
            .initial_delay(step)
            .max_delay(step.saturating_mul(u32::try_from(max_attempts).unwrap_or(u32::MAX)))
            .build();
        Self::new(inner, policy)
    }

    /// The policy in use
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl Datastore for RetryingDatastore {
    fn find_customer_by_phone<'a>(
        &'a self,
        phone_number: &'a str,
    ) -> DatastoreFuture<'a, Option<Customer>> {
        Box::pin(retry_with_predicate(
            &self.policy,
            move || self.inner.find_customer_by_phone(phone_number),
            DatastoreError::is_connection,
        ))
    }

    fn find_agent_by_name<'a>(&'a self, name: &'a str) -> DatastoreFuture<'a, Option<Agent>> {
        Box::pin(retry_with_predicate(
            &self.policy,
            move || self.inner.find_agent_by_name(name),
            DatastoreError::is_connection,
        ))
    }

    fn find_agent_by_id(&self, agent_id: AgentId) -> DatastoreFuture<'_, Option<Agent>> {
        Box::pin(retry_with_predicate(
            &self.policy,
            move || self.inner.find_agent_by_id(agent_id),
            DatastoreError::is_connection,
        ))
    }

    fn update_agent_current_number(
        &self,
        agent_id: AgentId,
        expected: Option<i64>,
        next: i64,
    ) -> DatastoreFuture<'_, bool> {
        Box::pin(retry_with_predicate(
            &self.policy,
            move || self.inner.update_agent_current_number(agent_id, expected, next),
            DatastoreError::is_connection,
        ))
    }

    fn create_ticket<'a>(&'a self, ticket: &'a Ticket) -> DatastoreFuture<'a, ()> {
        Box::pin(retry_with_predicate(
            &self.policy,
            move || self.inner.create_ticket(ticket),
            DatastoreError::is_connection,
        ))
    }

    fn update_ticket_fields<'a>(
        &'a self,
        ticket_id: TicketId,
        expected_status: Option<AuditStatus>,
        patch: &'a TicketPatch,
    ) -> DatastoreFuture<'a, PatchOutcome> {
        Box::pin(retry_with_predicate(
            &self.policy,
            move || self.inner.update_ticket_fields(ticket_id, expected_status, patch),
            DatastoreError::is_connection,
        ))
    }

    fn find_ticket_by_id(&self, ticket_id: TicketId) -> DatastoreFuture<'_, Option<Ticket>> {
        Box::pin(retry_with_predicate(
            &self.policy,
            move || self.inner.find_ticket_by_id(ticket_id),
            DatastoreError::is_connection,
        ))
    }

    fn create_customer_history<'a>(
        &'a self,
        entry: &'a CustomerHistoryEntry,
    ) -> DatastoreFuture<'a, ()> {
        Box::pin(retry_with_predicate(
            &self.policy,
            move || self.inner.create_customer_history(entry),
            DatastoreError::is_connection,
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use receipt_desk_testing::{InMemoryDatastore, fixtures};

    fn retrying(store: &InMemoryDatastore) -> RetryingDatastore {
        RetryingDatastore::linear(Arc::new(store.clone()), 3, Duration::from_millis(250))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_errors_are_retried() {
        let store = InMemoryDatastore::new();
        let customer = fixtures::customer("Jo", "+255700000001");
        store.insert_customer(customer.clone());
        store.fail_next(2);

        let found = retrying(&store)
            .find_customer_by_phone("+255700000001")
            .await
            .unwrap();

        assert_eq!(found, Some(customer));
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let store = InMemoryDatastore::new();
        store.fail_next(5);

        let err = retrying(&store)
            .find_agent_by_name("Amina")
            .await
            .unwrap_err();

        assert!(err.is_connection());
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_numbers_are_not_retried() {
        let store = InMemoryDatastore::new();
        let agent = fixtures::issuing_agent("Amina", 1, 10);
        let customer = fixtures::customer("Jo", "+255700000001");
        store.insert_ticket(fixtures::ticket(&agent, &customer, 1));

        let clash = fixtures::ticket(&agent, &customer, 1);
        let err = retrying(&store).create_ticket(&clash).await.unwrap_err();

        assert!(matches!(err, DatastoreError::DuplicateTicketNumber { .. }));
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_insert_ack_is_absorbed_by_idempotent_create() {
        let store = InMemoryDatastore::new();
        let agent = fixtures::issuing_agent("Amina", 1, 10);
        let customer = fixtures::customer("Jo", "+255700000001");
        let ticket = fixtures::ticket(&agent, &customer, 1);
        store.lose_ack_on_ticket_insert(1);

        retrying(&store).create_ticket(&ticket).await.unwrap();

        assert_eq!(store.tickets().len(), 1);
    }
}
