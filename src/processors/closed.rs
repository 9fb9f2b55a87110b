use super::{ProcessorContext, StateProcessor};
use crate::error::Result;
use crate::plugins::PluginError;
use crate::state_machine::OrderState;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reclaims provider-side resources for CLOSED orders and prunes them from
/// the store. Cleanup failures are retried on later passes indefinitely:
/// deletion is never silently abandoned while a billable resource may still
/// exist. Past a configurable attempt count the order is logged as a
/// dead-letter candidate for operators.
pub struct ClosedProcessor {
    ctx: ProcessorContext,
}

impl ClosedProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    async fn prune(&self, order_id: Uuid) -> Result<()> {
        self.ctx.store.remove_order(order_id).await?;
        if let Err(e) = self.ctx.persistence.delete(order_id).await {
            warn!(order_id = %order_id, error = %e, "Failed to prune persisted order");
        }
        info!(order_id = %order_id, "Order cleaned up and removed");
        Ok(())
    }
}

#[async_trait]
impl StateProcessor for ClosedProcessor {
    fn name(&self) -> &'static str {
        "closed_processor"
    }

    fn state(&self) -> OrderState {
        OrderState::Closed
    }

    fn interval(&self) -> Duration {
        self.ctx.config.processors.closed_interval
    }

    async fn process_order(&self, order_id: Uuid) -> Result<()> {
        let Some(shared) = self.ctx.store.get(order_id) else {
            // Already pruned; repeated cleanup is a no-op.
            return Ok(());
        };
        let order = {
            let order = shared.lock().await;
            if order.state() != OrderState::Closed {
                return Ok(());
            }
            order.clone()
        };

        if order.instance_id.is_none() || order.cleanup_complete {
            // Nothing provider-side to reclaim.
            return self.prune(order_id).await;
        }

        let cleanup = match self.ctx.dispatcher.delete(&order).await {
            Ok(()) => Ok(()),
            // Already gone on the provider: cleanup is idempotent.
            Err(PluginError::InstanceNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        };

        match cleanup {
            Ok(()) => {
                shared.lock().await.cleanup_complete = true;
                self.prune(order_id).await
            }
            Err(e) => {
                let attempts = {
                    let mut order = shared.lock().await;
                    order.cleanup_attempts += 1;
                    order.cleanup_attempts
                };
                if attempts >= self.ctx.config.retries.cleanup_warn_threshold {
                    warn!(
                        order_id = %order_id,
                        attempts = attempts,
                        error = %e,
                        "Cleanup still failing; operator attention needed"
                    );
                } else {
                    debug!(order_id = %order_id, attempts = attempts, error = %e, "Cleanup failed; will retry");
                }
                Ok(())
            }
        }
    }
}
