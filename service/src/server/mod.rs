//! HTTP server module for the receipt desk.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Health and metrics endpoints
//! - Error-to-response mapping
//! - Router configuration

pub mod error;
pub mod health;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use health::health_check;
pub use routes::build_router;
pub use state::AppState;
