//! # Broker Core
//!
//! The composition root: owns the order store, transition guard, persistence
//! and processor set, and exposes the order API the HTTP layer calls into.
//! All components are constructed and injected here; nothing is reached
//! through ambient global state.

use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::events::{OrderEvent, OrderEventPublisher};
use crate::models::{FederationUser, Order, OrderSnapshot, ResourceParameters};
use crate::persistence::{OrderPersistence, RecoveryLoader};
use crate::plugins::{AuthorizationPlugin, CloudPlugin, RemoteDispatch};
use crate::processors::{standard_processors, Dispatcher, ProcessorContext, ProcessorSet};
use crate::state_machine::{OrderState, TransitionGuard};
use crate::store::OrderStore;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

/// A resource request from the API layer.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub requester: FederationUser,
    /// Defaults to the local provider when absent.
    pub target_provider: Option<String>,
    pub cloud_name: String,
    pub parameters: ResourceParameters,
}

/// The broker core system: order API plus the lifecycle engine.
pub struct BrokerCore {
    config: Arc<BrokerConfig>,
    store: Arc<OrderStore>,
    guard: Arc<TransitionGuard>,
    persistence: Arc<dyn OrderPersistence>,
    events: OrderEventPublisher,
    ctx: ProcessorContext,
    processors: Option<ProcessorSet>,
}

impl BrokerCore {
    pub fn new(
        config: BrokerConfig,
        plugin: Arc<dyn CloudPlugin>,
        auth: Arc<dyn AuthorizationPlugin>,
        remote: Arc<dyn RemoteDispatch>,
        persistence: Arc<dyn OrderPersistence>,
    ) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(OrderStore::new());
        let events = OrderEventPublisher::default();
        let guard = Arc::new(TransitionGuard::new(
            Arc::clone(&store),
            Arc::clone(&persistence),
            events.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            config.provider_id.clone(),
            plugin,
            remote,
            config.retries.remote_timeout,
        ));
        let ctx = ProcessorContext {
            store: Arc::clone(&store),
            guard: Arc::clone(&guard),
            dispatcher,
            auth,
            persistence: Arc::clone(&persistence),
            config: Arc::clone(&config),
        };

        Self {
            config,
            store,
            guard,
            persistence,
            events,
            ctx,
            processors: None,
        }
    }

    /// Recover persisted orders, then start the lifecycle processors.
    ///
    /// Recovery runs to completion before any processor begins draining
    /// queues, so workers never race a partially recovered store.
    pub async fn init(&mut self) -> Result<usize> {
        if self.processors.is_some() {
            return Err(BrokerError::ConfigurationError(
                "Broker already initialized".to_string(),
            ));
        }

        let loader = RecoveryLoader::new(Arc::clone(&self.persistence), Arc::clone(&self.store));
        let recovered = loader.recover_all().await?;

        let processors = standard_processors(&self.ctx);
        self.processors = Some(ProcessorSet::start(Arc::clone(&self.store), processors));
        info!(
            provider_id = %self.config.provider_id,
            recovered = recovered,
            "Broker core initialized"
        );
        Ok(recovered)
    }

    /// Stop the lifecycle processors gracefully.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(processors) = self.processors.take() {
            processors
                .shutdown(self.config.processors.shutdown_timeout)
                .await?;
        }
        info!("Broker core shut down");
        Ok(())
    }

    /// Accept a resource request: the order is persisted, indexed and
    /// enqueued OPEN. Authorization and dispatch happen asynchronously in
    /// the open processor.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Uuid> {
        let target_provider = request
            .target_provider
            .unwrap_or_else(|| self.config.provider_id.clone());
        let order = Order::new(
            request.requester,
            self.config.provider_id.clone(),
            target_provider,
            request.cloud_name,
            request.parameters,
        );
        let order_id = order.id;

        // Write-ahead: persist before the in-memory index so a crash in
        // between is recovered, not lost. Recovery tolerates the converse
        // (persisted but never processed) as at-least-once.
        self.persistence.persist(&order).await?;
        self.store.add_order(order)?;
        info!(order_id = %order_id, "Order accepted");
        Ok(order_id)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderSnapshot> {
        let shared = self
            .store
            .get(order_id)
            .ok_or(BrokerError::OrderNotFound(order_id))?;
        let order = shared.lock().await;
        Ok(order.snapshot())
    }

    /// Request deletion: the order moves toward CLOSED as the next legal
    /// transition regardless of which processor currently owns it; the
    /// closed processor then reclaims any provider-side instance.
    pub async fn delete_order(&self, order_id: Uuid) -> Result<()> {
        self.guard.transition(order_id, OrderState::Closed).await?;
        info!(order_id = %order_id, "Order closed by user request");
        Ok(())
    }

    pub async fn list_orders(&self, filter: Option<OrderState>) -> Vec<OrderSnapshot> {
        let mut snapshots = Vec::new();
        for order_id in self.store.order_ids() {
            if let Some(shared) = self.store.get(order_id) {
                let order = shared.lock().await;
                if filter.map_or(true, |state| order.state() == state) {
                    snapshots.push(order.snapshot());
                }
            }
        }
        snapshots
    }

    /// Subscribe to lifecycle transition events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<OrderEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<OrderStore> {
        &self.store
    }

    pub fn transition_guard(&self) -> &Arc<TransitionGuard> {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use crate::plugins::{AllowAllAuthorization, EmulatedCloudPlugin, NoRemoteDispatch};

    fn broker() -> BrokerCore {
        BrokerCore::new(
            BrokerConfig::for_testing(),
            Arc::new(EmulatedCloudPlugin::new()),
            Arc::new(AllowAllAuthorization),
            Arc::new(NoRemoteDispatch),
            Arc::new(InMemoryPersistence::new()),
        )
    }

    fn compute_request() -> CreateOrderRequest {
        CreateOrderRequest {
            requester: FederationUser {
                id: "heidi".to_string(),
                identity_provider: "idp.example.org".to_string(),
            },
            target_provider: None,
            cloud_name: "emulated".to_string(),
            parameters: ResourceParameters::Compute {
                vcpu: 1,
                ram_mb: 512,
                disk_gb: 5,
                image_id: "cirros".to_string(),
                public_key: None,
                user_data: None,
            },
        }
    }

    #[tokio::test]
    async fn created_order_is_enqueued_open() {
        let broker = broker();
        let id = broker.create_order(compute_request()).await.unwrap();

        let snapshot = broker.get_order(id).await.unwrap();
        assert_eq!(snapshot.state, OrderState::Open);
        assert_eq!(broker.store().queue_len(OrderState::Open), 1);
        assert_eq!(snapshot.target_provider, "local-provider");
    }

    #[tokio::test]
    async fn delete_moves_any_state_toward_closed() {
        let broker = broker();
        let id = broker.create_order(compute_request()).await.unwrap();

        broker.delete_order(id).await.unwrap();
        let snapshot = broker.get_order(id).await.unwrap();
        assert_eq!(snapshot.state, OrderState::Closed);

        // Deleting a closed order is an illegal transition, surfaced.
        assert!(broker.delete_order(id).await.is_err());
    }

    #[tokio::test]
    async fn list_orders_filters_by_state() {
        let broker = broker();
        let first = broker.create_order(compute_request()).await.unwrap();
        let second = broker.create_order(compute_request()).await.unwrap();
        broker.delete_order(second).await.unwrap();

        let open = broker.list_orders(Some(OrderState::Open)).await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, first);
        assert_eq!(broker.list_orders(None).await.len(), 2);
    }

    #[tokio::test]
    async fn init_recovers_persisted_orders_before_processors_start() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let order = Order::new(
            FederationUser {
                id: "ivan".to_string(),
                identity_provider: "idp.example.org".to_string(),
            },
            "local-provider",
            "local-provider",
            "emulated",
            ResourceParameters::Volume {
                size_gb: 1,
                name: None,
            },
        );
        let order_id = order.id;
        persistence.persist(&order).await.unwrap();

        let mut broker = BrokerCore::new(
            BrokerConfig::for_testing(),
            Arc::new(EmulatedCloudPlugin::new()),
            Arc::new(AllowAllAuthorization),
            Arc::new(NoRemoteDispatch),
            persistence,
        );
        let recovered = broker.init().await.unwrap();
        assert_eq!(recovered, 1);
        assert!(broker.get_order(order_id).await.is_ok());

        broker.shutdown().await.unwrap();
    }
}
