//! # Lifecycle Processors
//!
//! One independent polling worker per lifecycle state. Each worker repeatedly
//! snapshots its state's queue, performs the state-specific action for every
//! order, and requests transitions through the guard. A slow cloud call in
//! one worker never blocks the others, and one order's failure never blocks
//! the rest of its queue.

pub mod closed;
pub mod dispatch;
pub mod fulfilled;
pub mod open;
pub mod spawning;
pub mod unable;

#[cfg(test)]
pub(crate) mod test_support;

pub use closed::ClosedProcessor;
pub use dispatch::Dispatcher;
pub use fulfilled::FulfilledProcessor;
pub use open::OpenProcessor;
pub use spawning::SpawningProcessor;
pub use unable::UnableProcessor;

use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::persistence::OrderPersistence;
use crate::state_machine::{OrderState, TransitionGuard};
use crate::store::OrderStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything a lifecycle processor needs, injected by the composition root.
#[derive(Clone)]
pub struct ProcessorContext {
    pub store: Arc<OrderStore>,
    pub guard: Arc<TransitionGuard>,
    pub dispatcher: Arc<Dispatcher>,
    pub auth: Arc<dyn crate::plugins::AuthorizationPlugin>,
    pub persistence: Arc<dyn OrderPersistence>,
    pub config: Arc<BrokerConfig>,
}

impl ProcessorContext {
    /// Request a transition, treating a lost race as a skip rather than an
    /// error: a user delete may legally move the order out from under a
    /// processor between its snapshot and its transition attempt.
    pub(crate) async fn try_transition<F>(
        &self,
        order_id: Uuid,
        target: OrderState,
        mutate: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut crate::models::Order),
    {
        match self.guard.transition_with(order_id, target, mutate).await {
            Ok(_) => Ok(()),
            Err(crate::state_machine::StateMachineError::InvalidTransition { .. }) => {
                tracing::debug!(order_id = %order_id, target = %target, "Transition lost a race; skipping");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// A single-state polling worker. The worker loop in [`ProcessorSet`] drives
/// implementations; `process_order` handles exactly one order and must
/// revalidate the order's state under its lock, since the order may have
/// left the queue between the snapshot and the call.
#[async_trait]
pub trait StateProcessor: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// The state whose queue this processor drains.
    fn state(&self) -> OrderState;

    /// Sleep between full queue passes.
    fn interval(&self) -> Duration;

    async fn process_order(&self, order_id: Uuid) -> Result<()>;
}

/// Owns the spawned worker tasks and their shared shutdown signal.
pub struct ProcessorSet {
    running: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    handles: Vec<JoinHandle<()>>,
}

impl ProcessorSet {
    /// Spawn one worker task per processor. Callers must have finished
    /// recovery before this point, so workers never race a partially
    /// recovered store.
    pub fn start(store: Arc<OrderStore>, processors: Vec<Arc<dyn StateProcessor>>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let shutdown_notify = Arc::new(Notify::new());

        let handles = processors
            .into_iter()
            .map(|processor| {
                tokio::spawn(worker_loop(
                    Arc::clone(&store),
                    processor,
                    Arc::clone(&running),
                    Arc::clone(&shutdown_notify),
                ))
            })
            .collect();

        Self {
            running,
            shutdown_notify,
            handles,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop all workers and wait for them to finish their current pass.
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        self.running.store(false, Ordering::Release);
        self.shutdown_notify.notify_waiters();

        tokio::time::timeout(timeout, futures::future::join_all(self.handles))
            .await
            .map_err(|_| {
                BrokerError::ShutdownError(format!(
                    "Lifecycle processors did not stop within {timeout:?}"
                ))
            })?;
        Ok(())
    }
}

async fn worker_loop(
    store: Arc<OrderStore>,
    processor: Arc<dyn StateProcessor>,
    running: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
) {
    info!(processor = processor.name(), state = %processor.state(), "Lifecycle processor started");

    while running.load(Ordering::Acquire) {
        // Oldest first: the snapshot preserves the queue's FIFO order.
        for order_id in store.queue_snapshot(processor.state()) {
            if !running.load(Ordering::Acquire) {
                break;
            }
            // Per-order isolation: one order's failure must not block the
            // queue, and no error may kill the loop.
            if let Err(e) = processor.process_order(order_id).await {
                warn!(
                    processor = processor.name(),
                    order_id = %order_id,
                    error = %e,
                    "Order processing failed; continuing with next order"
                );
            }
        }

        tokio::select! {
            _ = shutdown_notify.notified() => {}
            _ = tokio::time::sleep(processor.interval()) => {}
        }
    }

    info!(processor = processor.name(), "Lifecycle processor stopped");
}

/// Build the full processor suite over one shared context.
pub fn standard_processors(ctx: &ProcessorContext) -> Vec<Arc<dyn StateProcessor>> {
    vec![
        Arc::new(OpenProcessor::new(ctx.clone())),
        Arc::new(SpawningProcessor::new(ctx.clone())),
        Arc::new(FulfilledProcessor::new(ctx.clone())),
        Arc::new(UnableProcessor::new(ctx.clone())),
        Arc::new(ClosedProcessor::new(ctx.clone())),
    ]
}
