use super::{OrderPersistence, PersistenceResult};
use crate::models::Order;
use crate::state_machine::OrderState;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory persistence, used by tests and recovery round-trips. Stores
/// deep clones so a persisted order is a true snapshot, not a live alias.
#[derive(Default)]
pub struct InMemoryPersistence {
    records: Mutex<HashMap<Uuid, Order>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }
}

#[async_trait]
impl OrderPersistence for InMemoryPersistence {
    async fn persist(&self, order: &Order) -> PersistenceResult<()> {
        self.records.lock().insert(order.id, order.clone());
        Ok(())
    }

    async fn load_by_state(&self, state: OrderState) -> PersistenceResult<Vec<Order>> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|order| order.state() == state)
            .cloned()
            .collect())
    }

    async fn delete(&self, order_id: Uuid) -> PersistenceResult<()> {
        self.records.lock().remove(&order_id);
        Ok(())
    }
}
