use super::{ProcessorContext, StateProcessor};
use crate::error::Result;
use crate::state_machine::OrderState;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Polls SPAWNING orders until the cloud reports them ready or failed.
/// Transient check failures are retried with a bounded per-order counter;
/// a per-order elapsed-time budget prevents an order from pinning the
/// SPAWNING state indefinitely.
pub struct SpawningProcessor {
    ctx: ProcessorContext,
}

impl SpawningProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StateProcessor for SpawningProcessor {
    fn name(&self) -> &'static str {
        "spawning_processor"
    }

    fn state(&self) -> OrderState {
        OrderState::Spawning
    }

    fn interval(&self) -> Duration {
        self.ctx.config.processors.spawning_interval
    }

    async fn process_order(&self, order_id: Uuid) -> Result<()> {
        let Some(shared) = self.ctx.store.get(order_id) else {
            return Ok(());
        };
        let order = {
            let order = shared.lock().await;
            if order.state() != OrderState::Spawning {
                return Ok(());
            }
            order.clone()
        };

        let elapsed = (chrono::Utc::now() - order.state_entered_at)
            .to_std()
            .unwrap_or_default();
        if elapsed > self.ctx.config.retries.spawning_timeout {
            warn!(
                order_id = %order_id,
                elapsed_secs = elapsed.as_secs(),
                "Spawning time budget exhausted; moving to unable_to_check_status"
            );
            return self
                .ctx
                .try_transition(order_id, OrderState::UnableToCheckStatus, |_| {})
                .await;
        }

        match self.ctx.dispatcher.fetch(&order).await {
            Ok(snapshot) => {
                if self.ctx.dispatcher.has_failed(&snapshot.cloud_state) {
                    // The cloud accepted the request but the instance entered
                    // an unrecoverable state.
                    warn!(order_id = %order_id, cloud_state = %snapshot.cloud_state, "Instance failed while spawning");
                    self.ctx
                        .try_transition(order_id, OrderState::FailedAfterSuccessfulRequest, |o| {
                            o.fault_message = Some(format!(
                                "instance entered state {}",
                                snapshot.cloud_state
                            ));
                        })
                        .await
                } else if self.ctx.dispatcher.is_ready(&snapshot.cloud_state) {
                    info!(order_id = %order_id, "Instance ready; order fulfilled");
                    self.ctx
                        .try_transition(order_id, OrderState::Fulfilled, |o| {
                            o.actual_allocation = snapshot.allocation.clone();
                        })
                        .await
                } else {
                    // Still provisioning; a successful check resets the
                    // failure counter and the order stays queued for the
                    // next pass.
                    shared.lock().await.status_check_failures = 0;
                    Ok(())
                }
            }
            Err(e) if e.is_transient() => {
                let failures = {
                    let mut order = shared.lock().await;
                    order.status_check_failures += 1;
                    order.status_check_failures
                };
                if failures >= self.ctx.config.retries.status_check_failure_limit {
                    warn!(order_id = %order_id, failures = failures, "Status check failure limit reached");
                    self.ctx
                        .try_transition(order_id, OrderState::UnableToCheckStatus, |_| {})
                        .await
                } else {
                    debug!(order_id = %order_id, failures = failures, error = %e, "Status check failed; will retry");
                    Ok(())
                }
            }
            Err(e) => {
                // Permanent: the instance is gone or the request is
                // malformed. No point in counting retries.
                warn!(order_id = %order_id, error = %e, "Unrecoverable status check failure");
                self.ctx
                    .try_transition(order_id, OrderState::UnableToCheckStatus, |o| {
                        o.fault_message = Some(format!("status check failed: {e}"));
                    })
                    .await
            }
        }
    }
}
