//! # Receipt Desk Runtime
//!
//! Execution support shared by the receipt desk services.
//!
//! ## Core Components
//!
//! - **Retry**: Predicate-driven retry with linear backoff
//! - **Effects**: Runs reducer effect descriptions and collects feedback actions
//! - **Metrics**: Prometheus recorder and per-concern metric helpers
//!
//! ## Example
//!
//! ```ignore
//! use receipt_desk_runtime::{effects, retry::{RetryPolicy, retry_with_predicate}};
//!
//! let effects = reducer.reduce(&mut state, action, &env);
//! let feedback = effects::execute(effects).await;
//!
//! let policy = RetryPolicy::default();
//! let ticket = retry_with_predicate(&policy, || store.find_ticket_by_id(id), DatastoreError::is_connection).await?;
//! ```

/// Retry logic with backoff
pub mod retry;

/// Effect execution
pub mod effects;

/// Prometheus metrics for observability
pub mod metrics;
