use super::{OrderPersistence, PersistenceResult};
use crate::state_machine::OrderState;
use crate::store::OrderStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Rebuilds the order store and per-state queues from persisted state on
/// process start, so in-flight work resumes where it left off.
///
/// Must run to completion before any lifecycle processor starts draining
/// queues; the composition root enforces that ordering.
pub struct RecoveryLoader {
    persistence: Arc<dyn OrderPersistence>,
    store: Arc<OrderStore>,
}

impl RecoveryLoader {
    pub fn new(persistence: Arc<dyn OrderPersistence>, store: Arc<OrderStore>) -> Self {
        Self { persistence, store }
    }

    /// Load every persisted order, grouped by state, and re-insert each into
    /// its corresponding queue. Returns the number of orders recovered.
    pub async fn recover_all(&self) -> PersistenceResult<usize> {
        let mut recovered = 0usize;
        for state in OrderState::ALL {
            let orders = self.persistence.load_by_state(state).await?;
            let count = orders.len();
            for order in orders {
                let order_id = order.id;
                // A duplicate here means the same id was persisted under two
                // states; keep the first occurrence and flag the record.
                if let Err(e) = self.store.restore_order(order) {
                    warn!(order_id = %order_id, error = %e, "Skipping unrecoverable persisted order");
                    continue;
                }
                recovered += 1;
            }
            if count > 0 {
                info!(state = %state, count = count, "Recovered orders for state");
            }
        }
        info!(total = recovered, "Order recovery complete");
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FederationUser, Order, ResourceParameters};
    use crate::persistence::InMemoryPersistence;

    fn order_in(state: OrderState, instance_id: Option<&str>) -> Order {
        let mut order = Order::new(
            FederationUser {
                id: "dave".to_string(),
                identity_provider: "idp.example.org".to_string(),
            },
            "provider-a",
            "provider-a",
            "default",
            ResourceParameters::Compute {
                vcpu: 1,
                ram_mb: 1024,
                disk_gb: 10,
                image_id: "debian-13".to_string(),
                public_key: None,
                user_data: None,
            },
        );
        order.set_state(state);
        order.instance_id = instance_id.map(str::to_string);
        order
    }

    #[tokio::test]
    async fn recovery_round_trip_reproduces_ids_states_and_instance_ids() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let originals = vec![
            order_in(OrderState::Open, None),
            order_in(OrderState::Spawning, Some("i-1")),
            order_in(OrderState::Fulfilled, Some("i-2")),
            order_in(OrderState::UnableToCheckStatus, Some("i-3")),
            order_in(OrderState::Closed, Some("i-4")),
        ];
        for order in &originals {
            persistence.persist(order).await.unwrap();
        }

        // Simulated restart: fresh store, recover from the backing store.
        let store = Arc::new(OrderStore::new());
        let loader = RecoveryLoader::new(persistence, Arc::clone(&store));
        let recovered = loader.recover_all().await.unwrap();

        assert_eq!(recovered, originals.len());
        assert_eq!(store.len(), originals.len());
        for original in &originals {
            let shared = store.get(original.id).expect("order missing after recovery");
            let order = shared.lock().await;
            assert_eq!(order.state(), original.state());
            assert_eq!(order.instance_id, original.instance_id);
            assert_eq!(store.queue_membership(original.id), vec![original.state()]);
        }
    }

    #[tokio::test]
    async fn recovery_of_empty_store_is_empty() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let store = Arc::new(OrderStore::new());
        let loader = RecoveryLoader::new(persistence, Arc::clone(&store));
        assert_eq!(loader.recover_all().await.unwrap(), 0);
        assert!(store.is_empty());
    }
}
