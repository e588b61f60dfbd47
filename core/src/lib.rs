//! # Receipt Desk Core
//!
//! Core traits and domain types for issuing and auditing payment receipts.
//!
//! Billing agents issue sequentially numbered receipts ("tickets") to
//! registered customers. Every ticket is announced to the customer by SMS and
//! then travels through an auditor approval lifecycle.
//!
//! ## Core Concepts
//!
//! - **Types**: Agents, customers, tickets and customer-history entries
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`,
//!   used for the audit lifecycle
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits (`Clock`)
//! - **Collaborators**: [`datastore::Datastore`], [`notification::NotificationGateway`]
//!   and [`receipt::ReceiptRenderer`] are consumed through traits so that the
//!   storage driver and SMS provider stay outside this crate
//!
//! ## Example
//!
//! ```ignore
//! use receipt_desk_core::audit::{AuditAction, AuditStatus};
//!
//! let next = AuditStatus::Rejected.apply(AuditAction::Resend)?;
//! assert_eq!(next, AuditStatus::Pending);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod audit;
pub mod datastore;
pub mod notification;
pub mod receipt;
pub mod types;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for AuditReducer {
    ///     type State = AuditState;
    ///     type Action = AuditCommand;
    ///     type Environment = AuditEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut AuditState,
    ///         action: AuditCommand,
    ///         env: &AuditEnvironment,
    ///     ) -> SmallVec<[Effect<AuditCommand>; 4]> {
    ///         match action {
    ///             AuditCommand::Approve { .. } => SmallVec::new(),
    ///             _ => SmallVec::new(),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the runtime after the reducer's
    /// state change has been persisted.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is handed back to the caller
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time source used in production.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};

    #[test]
    fn test_effect_debug_hides_futures() {
        let effect: Effect<()> = Effect::merge(vec![
            Effect::None,
            Effect::Future(Box::pin(async { None })),
        ]);
        assert_eq!(
            format!("{effect:?}"),
            "Effect::Parallel([Effect::None, Effect::Future(<future>)])"
        );
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
