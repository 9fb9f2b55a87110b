use super::{ProcessorContext, StateProcessor};
use crate::error::Result;
use crate::models::Order;
use crate::plugins::{AuthorizationError, BrokerOperation};
use crate::state_machine::{OrderState, StateMachineError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Drains the OPEN queue: authorizes each order, dispatches it to the local
/// cloud plugin or the remote federation, and moves it to SPAWNING. Denied
/// or undispatchable orders close immediately with the reason recorded on
/// the order.
pub struct OpenProcessor {
    ctx: ProcessorContext,
}

impl OpenProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }

    /// Delete an instance whose order was closed and pruned while the
    /// dispatch was in flight. Nothing will ever revisit the order, so the
    /// instance must be reclaimed here or it leaks on the provider.
    async fn reclaim_orphan(&self, order: &Order, instance_id: String) {
        warn!(
            order_id = %order.id,
            instance_id = %instance_id,
            "Order pruned during dispatch; reclaiming orphaned instance"
        );
        let mut orphan = order.clone();
        orphan.instance_id = Some(instance_id);
        if let Err(e) = self.ctx.dispatcher.delete(&orphan).await {
            error!(order_id = %order.id, error = %e, "Failed to reclaim orphaned instance");
        }
    }
}

#[async_trait]
impl StateProcessor for OpenProcessor {
    fn name(&self) -> &'static str {
        "open_processor"
    }

    fn state(&self) -> OrderState {
        OrderState::Open
    }

    fn interval(&self) -> Duration {
        self.ctx.config.processors.open_interval
    }

    async fn process_order(&self, order_id: Uuid) -> Result<()> {
        let Some(shared) = self.ctx.store.get(order_id) else {
            return Ok(());
        };
        // Dequeue-then-validate: the order may have been deleted since the
        // queue snapshot was taken.
        let order = {
            let order = shared.lock().await;
            if order.state() != OrderState::Open {
                return Ok(());
            }
            order.clone()
        };

        // No lock is held across the authorization or dispatch calls; only
        // the state mutation itself is serialized.
        let operation = BrokerOperation::Create(order.resource_type());
        let denial = match self.ctx.auth.is_authorized(&order.requester, &operation).await {
            Ok(true) => None,
            Ok(false) => Some(format!(
                "user {} is not authorized to {operation}",
                order.requester
            )),
            Err(AuthorizationError::Denied { user, operation }) => {
                Some(format!("user {user} is not authorized to {operation}"))
            }
            Err(e) => Some(format!("authorization could not be evaluated: {e}")),
        };
        if let Some(reason) = denial {
            info!(order_id = %order_id, reason = %reason, "Order denied; closing");
            return self
                .ctx
                .try_transition(order_id, OrderState::Closed, |o| {
                    o.fault_message = Some(reason);
                })
                .await;
        }

        match self.ctx.dispatcher.request(&order).await {
            Ok(instance_id) => {
                let result = self
                    .ctx
                    .guard
                    .transition_with(order_id, OrderState::Spawning, {
                        let instance_id = instance_id.clone();
                        move |o| o.instance_id = Some(instance_id)
                    })
                    .await;
                match result {
                    Ok(_) => {
                        info!(order_id = %order_id, instance_id = %instance_id, "Order dispatched and spawning");
                    }
                    Err(StateMachineError::InvalidTransition { .. }) => {
                        // A user delete raced the dispatch and won. Hand the
                        // freshly created instance to closed-state cleanup so
                        // it is not leaked.
                        debug!(order_id = %order_id, "Dispatch raced a delete; instance handed to cleanup");
                        {
                            let mut order = shared.lock().await;
                            if order.instance_id.is_none() {
                                order.instance_id = Some(instance_id.clone());
                            }
                        }
                        // The closed processor may have pruned the order
                        // between the transition attempt and the write above.
                        if !self.ctx.store.contains(order_id) {
                            self.reclaim_orphan(&order, instance_id).await;
                        }
                    }
                    Err(StateMachineError::OrderNotFound(_)) => {
                        // Deleted, cleaned up and pruned while the dispatch
                        // was in flight.
                        self.reclaim_orphan(&order, instance_id).await;
                    }
                }
            }
            Err(e) => {
                // Failed before any resource was committed, so no cleanup is
                // owed; the reason stays retrievable on the order.
                warn!(order_id = %order_id, error = %e, "Dispatch failed; closing order");
                self.ctx
                    .try_transition(order_id, OrderState::Closed, |o| {
                        o.fault_message = Some(format!("dispatch failed: {e}"));
                    })
                    .await?;
            }
        }

        Ok(())
    }
}
