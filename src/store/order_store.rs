use crate::error::{BrokerError, Result};
use crate::models::Order;
use crate::state_machine::OrderState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// An order entry shared between the API layer, the transition guard and the
/// lifecycle processors. The tokio mutex doubles as the per-order lock that
/// serializes concurrent transition attempts.
pub type SharedOrder = Arc<tokio::sync::Mutex<Order>>;

/// Thread-safe registry mapping order id to order, plus one ordered queue
/// per lifecycle state.
///
/// The store is the single source of truth for which orders exist and in
/// what state. Invariant: every indexed order id is a member of exactly one
/// state queue, the queue matching `order.state()`. The queues hold ids, not
/// orders, so queue operations never contend with per-order locks.
///
/// Constructed explicitly by the composition root and passed by reference to
/// each processor; there is no ambient global instance.
pub struct OrderStore {
    index: DashMap<Uuid, SharedOrder>,
    queues: [Mutex<VecDeque<Uuid>>; OrderState::COUNT],
}

impl OrderStore {
    pub fn new() -> Self {
        Self {
            index: DashMap::new(),
            queues: std::array::from_fn(|_| Mutex::new(VecDeque::new())),
        }
    }

    fn queue(&self, state: OrderState) -> &Mutex<VecDeque<Uuid>> {
        &self.queues[state.index()]
    }

    /// Register a new order and append it to its state's queue.
    ///
    /// Fails with [`BrokerError::DuplicateOrder`] if the id is already
    /// indexed, guarding against duplicate submission.
    pub fn add_order(&self, order: Order) -> Result<SharedOrder> {
        let id = order.id;
        let state = order.state();
        let shared: SharedOrder = Arc::new(tokio::sync::Mutex::new(order));

        match self.index.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(BrokerError::DuplicateOrder(id));
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&shared));
            }
        }
        self.queue(state).lock().push_back(id);
        debug!(order_id = %id, state = %state, "Order added to store");
        Ok(shared)
    }

    /// Re-register a recovered order into the queue matching its persisted
    /// state. Same semantics as [`Self::add_order`], separate entry point so
    /// recovery shows up distinctly in logs.
    pub fn restore_order(&self, order: Order) -> Result<SharedOrder> {
        let id = order.id;
        let state = order.state();
        let shared = self.add_order(order)?;
        debug!(order_id = %id, state = %state, "Order restored into store");
        Ok(shared)
    }

    pub fn get(&self, id: Uuid) -> Option<SharedOrder> {
        self.index.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.index.contains_key(&id)
    }

    /// Remove an order from the store entirely. Only permitted once the
    /// order is CLOSED; the closed processor calls this after provider-side
    /// cleanup is confirmed.
    pub async fn remove_order(&self, id: Uuid) -> Result<()> {
        let shared = self.get(id).ok_or(BrokerError::OrderNotFound(id))?;
        {
            let order = shared.lock().await;
            if order.state() != OrderState::Closed {
                return Err(BrokerError::StateTransitionError(format!(
                    "Order {id} cannot be removed in state {}",
                    order.state()
                )));
            }
            self.queue(OrderState::Closed).lock().retain(|x| *x != id);
        }
        self.index.remove(&id);
        debug!(order_id = %id, "Order removed from store");
        Ok(())
    }

    /// Move an order id from one state queue to the tail of another,
    /// preserving FIFO fairness within the target state.
    ///
    /// Caller must hold the order's lock. Both queue locks are acquired in
    /// index order so concurrent relocations cannot deadlock and the
    /// one-queue-membership invariant never has an observable gap.
    pub(crate) fn relocate(&self, id: Uuid, from: OrderState, to: OrderState) {
        debug_assert_ne!(from, to);
        let (first, second) = if from.index() < to.index() {
            (from, to)
        } else {
            (to, from)
        };
        let mut first_guard = self.queue(first).lock();
        let mut second_guard = self.queue(second).lock();
        let (from_queue, to_queue) = if first == from {
            (&mut *first_guard, &mut *second_guard)
        } else {
            (&mut *second_guard, &mut *first_guard)
        };
        from_queue.retain(|x| *x != id);
        to_queue.push_back(id);
    }

    /// Snapshot of a state queue's ids in FIFO order. Processors iterate the
    /// snapshot and revalidate each order's state under its lock, so an
    /// order that was moved concurrently is simply skipped.
    pub fn queue_snapshot(&self, state: OrderState) -> Vec<Uuid> {
        self.queue(state).lock().iter().copied().collect()
    }

    pub fn queue_len(&self, state: OrderState) -> usize {
        self.queue(state).lock().len()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All active order ids, in no particular order.
    pub fn order_ids(&self) -> Vec<Uuid> {
        self.index.iter().map(|entry| *entry.key()).collect()
    }

    /// Which queue, if any, currently holds the given id. Test support for
    /// the membership invariant.
    #[cfg(test)]
    pub(crate) fn queue_membership(&self, id: Uuid) -> Vec<OrderState> {
        OrderState::ALL
            .into_iter()
            .filter(|state| self.queue(*state).lock().contains(&id))
            .collect()
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}
