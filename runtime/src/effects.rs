//! Effect execution.
//!
//! Runs the effect descriptions returned by a reducer and collects the
//! actions they feed back. Parallel effects are spawned as tasks; sequential
//! effects run one after another in order.

use futures::future::BoxFuture;
use receipt_desk_core::effect::Effect;

/// Execute effects to completion.
///
/// Returns every action produced, in completion order for parallel effects and
/// in declaration order otherwise. A spawned task that panics is logged and
/// contributes no action.
pub async fn execute<A, I>(effects: I) -> Vec<A>
where
    A: Send + 'static,
    I: IntoIterator<Item = Effect<A>>,
{
    let mut actions = Vec::new();
    for effect in effects {
        actions.extend(execute_one(effect).await);
    }
    actions
}

fn execute_one<A>(effect: Effect<A>) -> BoxFuture<'static, Vec<A>>
where
    A: Send + 'static,
{
    Box::pin(async move {
        match effect {
            Effect::None => Vec::new(),
            Effect::Future(fut) => {
                tracing::trace!("Executing Effect::Future");
                fut.await.into_iter().collect()
            }
            Effect::Parallel(effects) => {
                tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                let handles: Vec<_> = effects
                    .into_iter()
                    .map(|e| tokio::spawn(execute_one(e)))
                    .collect();

                let mut actions = Vec::new();
                for result in futures::future::join_all(handles).await {
                    match result {
                        Ok(produced) => actions.extend(produced),
                        Err(e) => tracing::error!(error = %e, "Parallel effect task failed"),
                    }
                }
                actions
            }
            Effect::Sequential(effects) => {
                tracing::trace!("Executing Effect::Sequential with {} effects", effects.len());
                let mut actions = Vec::new();
                for e in effects {
                    actions.extend(execute_one(e).await);
                }
                actions
            }
        }
    })
}
