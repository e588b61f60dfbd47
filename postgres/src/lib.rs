//! `PostgreSQL` storage for the receipt desk.
//!
//! This crate provides a PostgreSQL-based implementation of the `Datastore`
//! trait from `receipt-desk-core`. It uses sqlx runtime queries and supports:
//!
//! - Conditional counter updates for race-free ticket-number allocation
//! - A `(agent_id, ticket_number)` uniqueness constraint as a second guard
//! - Guarded audit updates (row lock plus status check in one transaction)
//! - Connection pooling
//!
//! # Example
//!
//! ```ignore
//! use receipt_desk_postgres::{PoolConfig, PostgresDatastore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresDatastore::connect("postgres://localhost/receipts", &PoolConfig::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod datastore;

pub use datastore::{PoolConfig, PostgresDatastore};
