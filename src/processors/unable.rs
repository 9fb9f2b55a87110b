use super::{ProcessorContext, StateProcessor};
use crate::error::Result;
use crate::state_machine::OrderState;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rechecks orders whose status could not be determined. A successful check
/// routes the order back to FULFILLED (ready) or SPAWNING (exists but not
/// ready yet); a definitive failure, or exhausting the retry budget, closes
/// the order so the cleanup path reclaims whatever the provider still holds.
pub struct UnableProcessor {
    ctx: ProcessorContext,
}

impl UnableProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StateProcessor for UnableProcessor {
    fn name(&self) -> &'static str {
        "unable_processor"
    }

    fn state(&self) -> OrderState {
        OrderState::UnableToCheckStatus
    }

    fn interval(&self) -> Duration {
        self.ctx.config.processors.unable_interval
    }

    async fn process_order(&self, order_id: Uuid) -> Result<()> {
        let Some(shared) = self.ctx.store.get(order_id) else {
            return Ok(());
        };
        let order = {
            let order = shared.lock().await;
            if order.state() != OrderState::UnableToCheckStatus {
                return Ok(());
            }
            order.clone()
        };

        if order.status_check_failures >= self.ctx.config.retries.unable_retry_limit {
            warn!(
                order_id = %order_id,
                attempts = order.status_check_failures,
                "Recheck budget exhausted; closing order for cleanup"
            );
            return self
                .ctx
                .try_transition(order_id, OrderState::Closed, |o| {
                    o.fault_message = Some("status never recovered; order closed".to_string());
                })
                .await;
        }

        match self.ctx.dispatcher.fetch(&order).await {
            Ok(snapshot) => {
                if self.ctx.dispatcher.has_failed(&snapshot.cloud_state) {
                    warn!(order_id = %order_id, cloud_state = %snapshot.cloud_state, "Recheck found a failed instance; closing");
                    self.ctx
                        .try_transition(order_id, OrderState::Closed, |o| {
                            o.fault_message =
                                Some(format!("instance failed: {}", snapshot.cloud_state));
                        })
                        .await
                } else {
                    // The recheck succeeded: resume the state the order held
                    // before visibility was lost. A previously fulfilled
                    // order only needed its health check (exists and not
                    // failed) to pass again; for a previously spawning order,
                    // snapshot readiness decides whether provisioning is done.
                    let target = match order.previous_active_state {
                        Some(OrderState::Fulfilled) => OrderState::Fulfilled,
                        _ if self.ctx.dispatcher.is_ready(&snapshot.cloud_state) => {
                            OrderState::Fulfilled
                        }
                        _ => OrderState::Spawning,
                    };
                    info!(order_id = %order_id, target = %target, "Status recovered");
                    self.ctx
                        .try_transition(order_id, target, |o| {
                            if target == OrderState::Fulfilled {
                                o.actual_allocation = snapshot.allocation.clone();
                            }
                            o.previous_active_state = None;
                            o.fault_message = None;
                        })
                        .await
                }
            }
            Err(e) => {
                let failures = {
                    let mut order = shared.lock().await;
                    order.status_check_failures += 1;
                    order.status_check_failures
                };
                debug!(order_id = %order_id, attempts = failures, error = %e, "Recheck failed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::EmulatedCloudPlugin;
    use crate::processors::test_support::{failing_plugin, harness, test_order};
    use crate::processors::OpenProcessor;
    use std::sync::Arc;

    async fn unable_order(h: &crate::processors::test_support::Harness) -> Uuid {
        let order = test_order(h);
        let id = order.id;
        h.store.add_order(order).unwrap();
        OpenProcessor::new(h.ctx()).process_order(id).await.unwrap();
        h.guard
            .transition(id, OrderState::UnableToCheckStatus)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn recovered_ready_instance_returns_to_fulfilled() {
        let mut h = harness();
        h.plugin = Arc::new(EmulatedCloudPlugin::new());
        let id = unable_order(&h).await;

        UnableProcessor::new(h.ctx()).process_order(id).await.unwrap();

        let shared = h.store.get(id).unwrap();
        let order = shared.lock().await;
        assert_eq!(order.state(), OrderState::Fulfilled);
        assert!(order.fault_message.is_none());
        assert!(order.previous_active_state.is_none());
    }

    #[tokio::test]
    async fn recovered_provisioning_instance_returns_to_spawning() {
        let mut h = harness();
        h.plugin = Arc::new(EmulatedCloudPlugin::with_polls_until_ready(100));
        let id = unable_order(&h).await;

        UnableProcessor::new(h.ctx()).process_order(id).await.unwrap();

        let shared = h.store.get(id).unwrap();
        assert_eq!(shared.lock().await.state(), OrderState::Spawning);
    }

    #[tokio::test]
    async fn previously_fulfilled_order_recovers_without_waiting_for_readiness() {
        let mut h = harness();
        h.plugin = Arc::new(EmulatedCloudPlugin::with_polls_until_ready(100));
        let order = test_order(&h);
        let id = order.id;
        h.store.add_order(order).unwrap();
        OpenProcessor::new(h.ctx()).process_order(id).await.unwrap();
        h.guard.transition(id, OrderState::Fulfilled).await.unwrap();
        h.guard
            .transition(id, OrderState::UnableToCheckStatus)
            .await
            .unwrap();

        // The snapshot reports the instance extant but not ready; a
        // previously fulfilled order still returns to fulfilled.
        UnableProcessor::new(h.ctx()).process_order(id).await.unwrap();

        let shared = h.store.get(id).unwrap();
        let order = shared.lock().await;
        assert_eq!(order.state(), OrderState::Fulfilled);
        assert!(order.previous_active_state.is_none());
    }

    #[tokio::test]
    async fn exhausted_budget_closes_the_order() {
        let mut h = harness();
        h.config.retries.unable_retry_limit = 2;
        let id = unable_order(&h).await;
        h.plugin = failing_plugin();
        let processor = UnableProcessor::new(h.ctx());

        // Two failed rechecks consume the budget, the third pass closes.
        processor.process_order(id).await.unwrap();
        processor.process_order(id).await.unwrap();
        processor.process_order(id).await.unwrap();

        let shared = h.store.get(id).unwrap();
        let order = shared.lock().await;
        assert_eq!(order.state(), OrderState::Closed);
        assert!(order.fault_message.is_some());
    }

    #[tokio::test]
    async fn failed_instance_closes_for_cleanup() {
        let mut h = harness();
        let emulated = Arc::new(EmulatedCloudPlugin::new());
        h.plugin = emulated.clone();
        let id = unable_order(&h).await;
        let instance_id = {
            let shared = h.store.get(id).unwrap();
            let instance_id = shared.lock().await.instance_id.clone().unwrap();
            instance_id
        };
        emulated.fail_instance(&instance_id);

        UnableProcessor::new(h.ctx()).process_order(id).await.unwrap();

        let shared = h.store.get(id).unwrap();
        assert_eq!(shared.lock().await.state(), OrderState::Closed);
    }
}
