use super::errors::{StateMachineError, StateMachineResult};
use super::states::OrderState;
use crate::events::OrderEventPublisher;
use crate::models::Order;
use crate::persistence::OrderPersistence;
use crate::store::OrderStore;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Sole authority for moving an order from one state to another.
///
/// A transition acquires the order's own lock (never a global one), validates
/// the edge against the canonical table, moves the order between the
/// per-state queues, updates the state, persists, and publishes a lifecycle
/// event. An illegal edge fails before any mutation, so the order is left
/// unchanged.
pub struct TransitionGuard {
    store: Arc<OrderStore>,
    persistence: Arc<dyn OrderPersistence>,
    events: OrderEventPublisher,
}

impl TransitionGuard {
    pub fn new(
        store: Arc<OrderStore>,
        persistence: Arc<dyn OrderPersistence>,
        events: OrderEventPublisher,
    ) -> Self {
        Self {
            store,
            persistence,
            events,
        }
    }

    /// Transition an order to `target`.
    pub async fn transition(&self, order_id: Uuid, target: OrderState) -> StateMachineResult<OrderState> {
        self.transition_with(order_id, target, |_| {}).await
    }

    /// Transition an order to `target`, applying `mutate` to the order inside
    /// the critical section, after validation and before persistence.
    ///
    /// Processors use the mutator to record the outcome that justified the
    /// transition (instance id, allocation, fault message) atomically with
    /// the state change.
    pub async fn transition_with<F>(
        &self,
        order_id: Uuid,
        target: OrderState,
        mutate: F,
    ) -> StateMachineResult<OrderState>
    where
        F: FnOnce(&mut Order),
    {
        let shared = self
            .store
            .get(order_id)
            .ok_or(StateMachineError::OrderNotFound(order_id))?;

        // Per-order exclusive lock: serializes concurrent transition attempts
        // on the same order. Whichever attempt validates first wins; the
        // loser fails cleanly below with no partial mutation.
        let mut order = shared.lock().await;
        let current = order.state();

        if !current.can_transition_to(target) {
            return Err(StateMachineError::InvalidTransition {
                order_id,
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        self.store.relocate(order_id, current, target);

        // Remember which active state to return to when leaving
        // UNABLE_TO_CHECK_STATUS.
        if target == OrderState::UnableToCheckStatus && current.is_active() {
            order.previous_active_state = Some(current);
        }
        order.set_state(target);
        order.on_queue_timestamp = chrono::Utc::now();
        order.status_check_failures = 0;
        mutate(&mut order);

        // In-memory state is authoritative for the running process; a failed
        // persist costs recovery fidelity across a crash, not correctness
        // now. Logged, never silently hidden.
        if let Err(e) = self.persistence.persist(&order).await {
            error!(
                order_id = %order_id,
                from = %current,
                to = %target,
                error = %e,
                "Failed to persist state transition"
            );
        }

        self.events.publish(order_id, current, target);
        debug!(order_id = %order_id, from = %current, to = %target, "Order transitioned");

        Ok(target)
    }
}
