use super::{ProcessorContext, StateProcessor};
use crate::error::Result;
use crate::state_machine::OrderState;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Periodically re-polls FULFILLED orders to detect provider-side
/// disappearance or degradation. Fulfilled is the steady state, so its
/// interval is longer than the spawning processor's.
///
/// The transition table gives FULFILLED no edge to the failed state; a
/// degraded or vanished instance goes to UNABLE_TO_CHECK_STATUS, where the
/// recheck either recovers it or closes the order for cleanup.
pub struct FulfilledProcessor {
    ctx: ProcessorContext,
}

impl FulfilledProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StateProcessor for FulfilledProcessor {
    fn name(&self) -> &'static str {
        "fulfilled_processor"
    }

    fn state(&self) -> OrderState {
        OrderState::Fulfilled
    }

    fn interval(&self) -> Duration {
        self.ctx.config.processors.fulfilled_interval
    }

    async fn process_order(&self, order_id: Uuid) -> Result<()> {
        let Some(shared) = self.ctx.store.get(order_id) else {
            return Ok(());
        };
        let order = {
            let order = shared.lock().await;
            if order.state() != OrderState::Fulfilled {
                return Ok(());
            }
            order.clone()
        };

        match self.ctx.dispatcher.fetch(&order).await {
            Ok(snapshot) => {
                if self.ctx.dispatcher.has_failed(&snapshot.cloud_state) {
                    warn!(order_id = %order_id, cloud_state = %snapshot.cloud_state, "Fulfilled instance degraded");
                    self.ctx
                        .try_transition(order_id, OrderState::UnableToCheckStatus, |o| {
                            o.fault_message =
                                Some(format!("instance degraded to {}", snapshot.cloud_state));
                        })
                        .await
                } else {
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
                    warn!(order_id = %order_id, failures = failures, "Health check failure limit reached");
                    self.ctx
                        .try_transition(order_id, OrderState::UnableToCheckStatus, |_| {})
                        .await
                } else {
                    debug!(order_id = %order_id, failures = failures, error = %e, "Health check failed; will retry");
                    Ok(())
                }
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Fulfilled instance is gone");
                self.ctx
                    .try_transition(order_id, OrderState::UnableToCheckStatus, |o| {
                        o.fault_message = Some(format!("instance disappeared: {e}"));
                    })
                    .await
            }
        }
    }
}
