//! In-memory datastore for fast, deterministic tests.
//!
//! Mirrors the guarantees of the Postgres adapter: conditional counter
//! updates, the `(agent_id, ticket_number)` uniqueness constraint and guarded
//! ticket patches. Fault injection covers the connection failures the service
//! layer retries on.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use receipt_desk_core::audit::AuditStatus;
use receipt_desk_core::datastore::{
    Datastore, DatastoreError, DatastoreFuture, PatchOutcome, TicketPatch,
};
use receipt_desk_core::types::{
    Agent, AgentId, Customer, CustomerHistoryEntry, StaffRole, Ticket, TicketId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Default)]
struct Tables {
    agents: HashMap<AgentId, Agent>,
    customers: Vec<Customer>,
    tickets: HashMap<TicketId, Ticket>,
    history: Vec<CustomerHistoryEntry>,
}

#[derive(Debug, Default)]
struct Faults {
    /// Calls that fail with a connection error before touching any table
    fail_next: AtomicUsize,
    /// Ticket inserts that commit and then report a connection error
    lose_ack_on_ticket_insert: AtomicUsize,
    /// Ticket inserts that fail with a connection error without committing
    fail_ticket_inserts: AtomicUsize,
    /// Value written to an agent's counter just before the next conditional update
    concurrent_advance: Mutex<Option<(AgentId, Option<i64>)>>,
    /// Patch another writer applies right after the next load of a ticket
    concurrent_patch: Mutex<Option<(TicketId, TicketPatch)>>,
}

/// HashMap-backed [`Datastore`].
///
/// Cloning shares the underlying tables, so a test can keep a handle for
/// assertions while the service owns another.
///
/// # Example
///
/// ```
/// use receipt_desk_testing::{InMemoryDatastore, fixtures};
///
/// let store = InMemoryDatastore::new();
/// let agent = fixtures::issuing_agent("Amina", 100, 102);
/// store.insert_agent(agent.clone());
/// assert_eq!(store.agent(agent.id).unwrap().current_number, None);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryDatastore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Faults>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryDatastore {
    /// Create an empty datastore
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an agent (any role)
    pub fn insert_agent(&self, agent: Agent) {
        self.tables.write().unwrap().agents.insert(agent.id, agent);
    }

    /// Seed a customer
    pub fn insert_customer(&self, customer: Customer) {
        self.tables.write().unwrap().customers.push(customer);
    }

    /// Seed a ticket, bypassing the uniqueness check
    pub fn insert_ticket(&self, ticket: Ticket) {
        self.tables.write().unwrap().tickets.insert(ticket.id, ticket);
    }

    /// Current snapshot of an agent
    #[must_use]
    pub fn agent(&self, agent_id: AgentId) -> Option<Agent> {
        self.tables.read().unwrap().agents.get(&agent_id).cloned()
    }

    /// Current snapshot of a ticket
    #[must_use]
    pub fn ticket(&self, ticket_id: TicketId) -> Option<Ticket> {
        self.tables.read().unwrap().tickets.get(&ticket_id).cloned()
    }

    /// All stored tickets, ordered by ticket number
    #[must_use]
    pub fn tickets(&self) -> Vec<Ticket> {
        let mut tickets: Vec<_> = self.tables.read().unwrap().tickets.values().cloned().collect();
        tickets.sort_by(|a, b| a.ticket_number.cmp(&b.ticket_number));
        tickets
    }

    /// All customer-history entries in insertion order
    #[must_use]
    pub fn history(&self) -> Vec<CustomerHistoryEntry> {
        self.tables.read().unwrap().history.clone()
    }

    /// Number of trait calls served (including injected failures)
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next `n` calls fail with [`DatastoreError::Connection`]
    pub fn fail_next(&self, n: usize) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` ticket inserts commit but report a connection error
    pub fn lose_ack_on_ticket_insert(&self, n: usize) {
        self.faults.lose_ack_on_ticket_insert.store(n, Ordering::SeqCst);
    }

    /// Simulate another writer advancing `agent_id` to `value` right before
    /// the next conditional counter update
    pub fn simulate_concurrent_advance(&self, agent_id: AgentId, value: Option<i64>) {
        *self.faults.concurrent_advance.lock().unwrap() = Some((agent_id, value));
    }

    /// Make the next `n` ticket inserts fail with a connection error; nothing
    /// is stored
    pub fn fail_ticket_inserts(&self, n: usize) {
        self.faults.fail_ticket_inserts.store(n, Ordering::SeqCst);
    }

    /// Simulate another writer applying `patch` to `ticket_id` right after the
    /// next `find_ticket_by_id` for it returns; the caller sees the old row
    pub fn simulate_concurrent_patch(&self, ticket_id: TicketId, patch: TicketPatch) {
        *self.faults.concurrent_patch.lock().unwrap() = Some((ticket_id, patch));
    }

    fn enter(&self) -> Result<(), DatastoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.faults.fail_next) {
            return Err(DatastoreError::Connection("injected connection failure".to_string()));
        }
        Ok(())
    }

    fn take_lost_ack(&self) -> bool {
        take_one(&self.faults.lose_ack_on_ticket_insert)
    }

    fn take_concurrent_patch(&self, ticket_id: TicketId) -> Option<TicketPatch> {
        let mut slot = self.faults.concurrent_patch.lock().unwrap();
        match slot.as_ref() {
            Some((id, _)) if *id == ticket_id => slot.take().map(|(_, patch)| patch),
            _ => None,
        }
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl Datastore for InMemoryDatastore {
    fn find_customer_by_phone<'a>(
        &'a self,
        phone_number: &'a str,
    ) -> DatastoreFuture<'a, Option<Customer>> {
        Box::pin(async move {
            self.enter()?;
            let tables = self.tables.read().unwrap();
            Ok(tables
                .customers
                .iter()
                .find(|c| c.phone_number == phone_number)
                .cloned())
        })
    }

    fn find_agent_by_name<'a>(&'a self, name: &'a str) -> DatastoreFuture<'a, Option<Agent>> {
        Box::pin(async move {
            self.enter()?;
            let tables = self.tables.read().unwrap();
            Ok(tables
                .agents
                .values()
                .find(|a| a.role == StaffRole::IssuingAgent && a.name == name)
                .cloned())
        })
    }

    fn find_agent_by_id(&self, agent_id: AgentId) -> DatastoreFuture<'_, Option<Agent>> {
        Box::pin(async move {
            self.enter()?;
            Ok(self.agent(agent_id))
        })
    }

    fn update_agent_current_number(
        &self,
        agent_id: AgentId,
        expected: Option<i64>,
        next: i64,
    ) -> DatastoreFuture<'_, bool> {
        Box::pin(async move {
            self.enter()?;
            let interference = self.faults.concurrent_advance.lock().unwrap().take();

            let mut tables = self.tables.write().unwrap();
            if let Some((id, value)) = interference {
                if let Some(agent) = tables.agents.get_mut(&id) {
                    agent.current_number = value;
                }
            }

            match tables.agents.get_mut(&agent_id) {
                Some(agent) if agent.current_number == expected => {
                    agent.current_number = Some(next);
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn create_ticket<'a>(&'a self, ticket: &'a Ticket) -> DatastoreFuture<'a, ()> {
        Box::pin(async move {
            self.enter()?;
            if take_one(&self.faults.fail_ticket_inserts) {
                return Err(DatastoreError::Connection("injected insert failure".to_string()));
            }
            {
                let mut tables = self.tables.write().unwrap();
                if tables.tickets.contains_key(&ticket.id) {
                    return Ok(());
                }
                let taken = tables.tickets.values().any(|t| {
                    t.agent_id == ticket.agent_id && t.ticket_number == ticket.ticket_number
                });
                if taken {
                    return Err(DatastoreError::DuplicateTicketNumber {
                        agent_id: ticket.agent_id,
                        ticket_number: ticket.ticket_number.clone(),
                    });
                }
                tables.tickets.insert(ticket.id, ticket.clone());
            }

            if self.take_lost_ack() {
                return Err(DatastoreError::Connection(
                    "connection reset after commit".to_string(),
                ));
            }
            Ok(())
        })
    }

    fn update_ticket_fields<'a>(
        &'a self,
        ticket_id: TicketId,
        expected_status: Option<AuditStatus>,
        patch: &'a TicketPatch,
    ) -> DatastoreFuture<'a, PatchOutcome> {
        Box::pin(async move {
            self.enter()?;
            let mut tables = self.tables.write().unwrap();
            let Some(ticket) = tables.tickets.get_mut(&ticket_id) else {
                return Ok(PatchOutcome::NotFound);
            };
            if let Some(expected) = expected_status {
                if ticket.audit_status != expected {
                    return Ok(PatchOutcome::StatusChanged {
                        actual: ticket.audit_status,
                    });
                }
            }
            patch.apply_to(ticket);
            Ok(PatchOutcome::Applied(Box::new(ticket.clone())))
        })
    }

    fn find_ticket_by_id(&self, ticket_id: TicketId) -> DatastoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            self.enter()?;
            let loaded = self.ticket(ticket_id);
            if let Some(patch) = self.take_concurrent_patch(ticket_id) {
                if let Some(ticket) = self.tables.write().unwrap().tickets.get_mut(&ticket_id) {
                    patch.apply_to(ticket);
                }
            }
            Ok(loaded)
        })
    }

    fn create_customer_history<'a>(
        &'a self,
        entry: &'a CustomerHistoryEntry,
    ) -> DatastoreFuture<'a, ()> {
        Box::pin(async move {
            self.enter()?;
            let mut tables = self.tables.write().unwrap();
            if !tables.history.iter().any(|h| h.id == entry.id) {
                tables.history.push(entry.clone());
            }
            Ok(())
        })
    }
}
