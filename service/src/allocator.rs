//! Per-agent ticket number allocation.
//!
//! An agent owns an inclusive range of ticket numbers and a `current_number`
//! cursor stored in the datastore. Allocation plans the next number from the
//! agent row and commits it with a conditional update, so two requests that
//! read the same cursor can never both win the same number. The loser re-reads
//! the agent and plans again.
//!
//! Allocated numbers are never handed back, even if the ticket that would have
//! used one fails to persist.

use crate::error::{ServiceError, ServiceResult};
use receipt_desk_core::datastore::Datastore;
use receipt_desk_core::types::{Agent, RangeError, TicketNumber};
use receipt_desk_runtime::metrics::AllocationMetrics;
use std::sync::Arc;

/// Default number of conditional-update attempts before giving up
pub const DEFAULT_ALLOCATION_ATTEMPTS: usize = 8;

/// Hands out agent-scoped ticket numbers.
#[derive(Clone)]
pub struct TicketNumberAllocator {
    store: Arc<dyn Datastore>,
    max_attempts: usize,
}

impl TicketNumberAllocator {
    /// Create an allocator over `store`
    #[must_use]
    pub fn new(store: Arc<dyn Datastore>, max_attempts: usize) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Allocate the next number for `agent` and durably record the advance.
    ///
    /// `agent` is the caller's snapshot; it is refreshed from storage whenever
    /// another writer got there first.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotConfigured`] if the agent has no range
    /// - [`ServiceError::RangeExhausted`] if the range is used up (nothing is written)
    /// - [`ServiceError::InvalidAgent`] if the agent disappears or is deactivated meanwhile
    /// - [`ServiceError::PersistenceFailed`] on storage errors or persistent contention
    pub async fn allocate(&self, agent: &Agent) -> ServiceResult<TicketNumber> {
        let mut current = agent.clone();

        for attempt in 1..=self.max_attempts {
            let plan = current.plan_next_number().map_err(|err| match err {
                RangeError::NotConfigured => ServiceError::NotConfigured {
                    agent: current.name.clone(),
                },
                RangeError::Exhausted { range_end } => {
                    AllocationMetrics::record_exhausted();
                    ServiceError::RangeExhausted {
                        agent: current.name.clone(),
                        range_end,
                    }
                }
            })?;

            let committed = self
                .store
                .update_agent_current_number(current.id, plan.expected, plan.number.value())
                .await?;

            if committed {
                if plan.reset {
                    AllocationMetrics::record_reset();
                    tracing::info!(
                        agent_id = %current.id,
                        previous = ?plan.expected,
                        number = plan.number.value(),
                        "Ticket counter reset to range start"
                    );
                }
                AllocationMetrics::record_allocated();
                tracing::debug!(
                    agent_id = %current.id,
                    number = plan.number.value(),
                    attempt,
                    "Ticket number allocated"
                );
                return Ok(plan.number);
            }

            AllocationMetrics::record_conflict();
            tracing::debug!(
                agent_id = %current.id,
                attempt,
                expected = ?plan.expected,
                "Ticket counter moved underneath us, re-reading agent"
            );

            current = self.reload(&current).await?;
        }

        tracing::warn!(
            agent_id = %current.id,
            attempts = self.max_attempts,
            "Giving up on contended ticket counter"
        );
        Err(ServiceError::PersistenceFailed(format!(
            "could not allocate a ticket number for agent {} after {} attempts",
            current.name, self.max_attempts
        )))
    }

    async fn reload(&self, agent: &Agent) -> ServiceResult<Agent> {
        match self.store.find_agent_by_id(agent.id).await? {
            Some(fresh) if fresh.is_active => Ok(fresh),
            Some(_) => Err(ServiceError::InvalidAgent(format!(
                "agent {} was deactivated",
                agent.name
            ))),
            None => Err(ServiceError::InvalidAgent(format!(
                "agent {} no longer exists",
                agent.name
            ))),
        }
    }
}
