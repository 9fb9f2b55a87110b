//! End-to-end lifecycle tests: a full broker with running processors,
//! emulated or scripted cloud backends, and the order API on top.

use async_trait::async_trait;
use broker_core::broker::{BrokerCore, CreateOrderRequest};
use broker_core::config::BrokerConfig;
use broker_core::models::{FederationUser, Order, OrderSnapshot, ResourceParameters};
use broker_core::persistence::InMemoryPersistence;
use broker_core::plugins::{
    AllowAllAuthorization, AuthorizationError, AuthorizationPlugin, BrokerOperation,
    CloudCredentials, CloudPlugin, EmulatedCloudPlugin, InstanceSnapshot, NoRemoteDispatch,
    PluginError, RemoteDispatch, RemoteDispatchError, RemoteRequest, RemoteResponse,
};
use broker_core::state_machine::OrderState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Delegating plugin that counts request and delete calls.
struct CountingPlugin {
    inner: EmulatedCloudPlugin,
    requests: AtomicU32,
    deletes: AtomicU32,
}

impl CountingPlugin {
    fn new(inner: EmulatedCloudPlugin) -> Self {
        Self {
            inner,
            requests: AtomicU32::new(0),
            deletes: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CloudPlugin for CountingPlugin {
    async fn request_instance(
        &self,
        order: &Order,
        credentials: &CloudCredentials,
    ) -> Result<String, PluginError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.inner.request_instance(order, credentials).await
    }

    async fn get_instance(
        &self,
        order: &Order,
        credentials: &CloudCredentials,
    ) -> Result<InstanceSnapshot, PluginError> {
        self.inner.get_instance(order, credentials).await
    }

    async fn delete_instance(
        &self,
        order: &Order,
        credentials: &CloudCredentials,
    ) -> Result<(), PluginError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_instance(order, credentials).await
    }

    fn is_ready(&self, cloud_state: &str) -> bool {
        self.inner.is_ready(cloud_state)
    }

    fn has_failed(&self, cloud_state: &str) -> bool {
        self.inner.has_failed(cloud_state)
    }
}

struct DenyAllAuthorization;

#[async_trait]
impl AuthorizationPlugin for DenyAllAuthorization {
    async fn is_authorized(
        &self,
        _user: &FederationUser,
        _operation: &BrokerOperation,
    ) -> Result<bool, AuthorizationError> {
        Ok(false)
    }
}

/// Remote peer whose instances are ready immediately.
struct ScriptedRemote {
    deletes: AtomicU32,
}

impl ScriptedRemote {
    fn new() -> Self {
        Self {
            deletes: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RemoteDispatch for ScriptedRemote {
    async fn send(
        &self,
        _remote_provider: &str,
        request: RemoteRequest,
    ) -> Result<RemoteResponse, RemoteDispatchError> {
        match request {
            RemoteRequest::CreateOrder { .. } => Ok(RemoteResponse {
                instance_id: Some("r-1".to_string()),
                instance: None,
            }),
            RemoteRequest::GetInstance { .. } => Ok(RemoteResponse {
                instance_id: Some("r-1".to_string()),
                instance: Some(InstanceSnapshot {
                    instance_id: "r-1".to_string(),
                    cloud_state: "ready".to_string(),
                    allocation: None,
                    attributes: HashMap::new(),
                }),
            }),
            RemoteRequest::DeleteInstance { .. } => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                Ok(RemoteResponse::default())
            }
        }
    }
}

fn requester() -> FederationUser {
    FederationUser {
        id: "alice".to_string(),
        identity_provider: "idp.example.org".to_string(),
    }
}

fn compute_request(target_provider: Option<&str>) -> CreateOrderRequest {
    CreateOrderRequest {
        requester: requester(),
        target_provider: target_provider.map(str::to_string),
        cloud_name: "emulated".to_string(),
        parameters: ResourceParameters::Compute {
            vcpu: 2,
            ram_mb: 2048,
            disk_gb: 20,
            image_id: "ubuntu-24.04".to_string(),
            public_key: None,
            user_data: None,
        },
    }
}

async fn wait_for_state(broker: &BrokerCore, order_id: Uuid, state: OrderState) -> OrderSnapshot {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(snapshot) = broker.get_order(order_id).await {
                if snapshot.state == state {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("order {order_id} never reached {state}"))
}

async fn wait_for_removal(broker: &BrokerCore, order_id: Uuid) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.get_order(order_id).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("order {order_id} was never removed"));
}

#[tokio::test]
async fn local_compute_order_reaches_fulfilled() {
    let mut broker = BrokerCore::new(
        BrokerConfig::for_testing(),
        Arc::new(EmulatedCloudPlugin::with_polls_until_ready(2)),
        Arc::new(AllowAllAuthorization),
        Arc::new(NoRemoteDispatch),
        Arc::new(InMemoryPersistence::new()),
    );
    broker.init().await.unwrap();

    let order_id = broker.create_order(compute_request(None)).await.unwrap();
    let snapshot = wait_for_state(&broker, order_id, OrderState::Fulfilled).await;

    assert!(snapshot.instance_id.is_some());
    let allocation = snapshot.actual_allocation.expect("allocation recorded");
    assert_eq!(allocation.vcpu, Some(2));
    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn delete_during_spawning_cleans_up_exactly_once() {
    // Instances never become ready, so the order stays SPAWNING until the
    // user delete races in.
    let plugin = Arc::new(CountingPlugin::new(
        EmulatedCloudPlugin::with_polls_until_ready(u32::MAX),
    ));
    let mut broker = BrokerCore::new(
        BrokerConfig::for_testing(),
        Arc::clone(&plugin) as Arc<dyn CloudPlugin>,
        Arc::new(AllowAllAuthorization),
        Arc::new(NoRemoteDispatch),
        Arc::new(InMemoryPersistence::new()),
    );
    broker.init().await.unwrap();

    let order_id = broker.create_order(compute_request(None)).await.unwrap();
    wait_for_state(&broker, order_id, OrderState::Spawning).await;

    broker.delete_order(order_id).await.unwrap();
    wait_for_removal(&broker, order_id).await;

    assert_eq!(plugin.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(plugin.inner.instance_count(), 0);
    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn deleted_failed_order_reclaims_its_instance() {
    // Instances never become ready on their own; the hypervisor failure is
    // injected while the order is still SPAWNING.
    let plugin = Arc::new(EmulatedCloudPlugin::with_polls_until_ready(u32::MAX));
    let mut broker = BrokerCore::new(
        BrokerConfig::for_testing(),
        Arc::clone(&plugin) as Arc<dyn CloudPlugin>,
        Arc::new(AllowAllAuthorization),
        Arc::new(NoRemoteDispatch),
        Arc::new(InMemoryPersistence::new()),
    );
    broker.init().await.unwrap();

    let order_id = broker.create_order(compute_request(None)).await.unwrap();
    let snapshot = wait_for_state(&broker, order_id, OrderState::Spawning).await;
    plugin.fail_instance(snapshot.instance_id.as_deref().unwrap());

    // The failed order keeps its instance until the user deletes it.
    wait_for_state(&broker, order_id, OrderState::FailedAfterSuccessfulRequest).await;
    assert_eq!(plugin.instance_count(), 1);

    broker.delete_order(order_id).await.unwrap();
    wait_for_removal(&broker, order_id).await;
    assert_eq!(plugin.instance_count(), 0);
    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn denied_order_closes_without_touching_the_cloud() {
    let plugin = Arc::new(CountingPlugin::new(EmulatedCloudPlugin::new()));
    let mut broker = BrokerCore::new(
        BrokerConfig::for_testing(),
        Arc::clone(&plugin) as Arc<dyn CloudPlugin>,
        Arc::new(DenyAllAuthorization),
        Arc::new(NoRemoteDispatch),
        Arc::new(InMemoryPersistence::new()),
    );
    broker.init().await.unwrap();

    let mut events = broker.subscribe_events();
    let order_id = broker.create_order(compute_request(None)).await.unwrap();

    // The denied order closes and, having no instance, is pruned entirely.
    wait_for_removal(&broker, order_id).await;
    assert_eq!(plugin.requests.load(Ordering::SeqCst), 0);

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.order_id, order_id);
    assert_eq!(event.from, OrderState::Open);
    assert_eq!(event.to, OrderState::Closed);
    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn remote_order_is_dispatched_through_the_federation() {
    let remote = Arc::new(ScriptedRemote::new());
    let mut broker = BrokerCore::new(
        BrokerConfig::for_testing(),
        Arc::new(EmulatedCloudPlugin::new()),
        Arc::new(AllowAllAuthorization),
        Arc::clone(&remote) as Arc<dyn RemoteDispatch>,
        Arc::new(InMemoryPersistence::new()),
    );
    broker.init().await.unwrap();

    let order_id = broker
        .create_order(compute_request(Some("remote-provider")))
        .await
        .unwrap();
    let snapshot = wait_for_state(&broker, order_id, OrderState::Fulfilled).await;
    assert_eq!(snapshot.instance_id.as_deref(), Some("r-1"));
    assert_eq!(snapshot.target_provider, "remote-provider");

    broker.delete_order(order_id).await.unwrap();
    wait_for_removal(&broker, order_id).await;
    assert_eq!(remote.deletes.load(Ordering::SeqCst), 1);
    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn restart_resumes_in_flight_orders() {
    let persistence = Arc::new(InMemoryPersistence::new());
    let plugin = Arc::new(EmulatedCloudPlugin::with_polls_until_ready(u32::MAX));

    let order_id = {
        let mut broker = BrokerCore::new(
            BrokerConfig::for_testing(),
            Arc::clone(&plugin) as Arc<dyn CloudPlugin>,
            Arc::new(AllowAllAuthorization),
            Arc::new(NoRemoteDispatch),
            Arc::clone(&persistence) as Arc<dyn broker_core::persistence::OrderPersistence>,
        );
        broker.init().await.unwrap();
        let order_id = broker.create_order(compute_request(None)).await.unwrap();
        wait_for_state(&broker, order_id, OrderState::Spawning).await;
        broker.shutdown().await.unwrap();
        order_id
    };

    // The restarted process sees the same backing store and the same cloud.
    let mut broker = BrokerCore::new(
        BrokerConfig::for_testing(),
        Arc::clone(&plugin) as Arc<dyn CloudPlugin>,
        Arc::new(AllowAllAuthorization),
        Arc::new(NoRemoteDispatch),
        Arc::clone(&persistence) as Arc<dyn broker_core::persistence::OrderPersistence>,
    );
    let recovered = broker.init().await.unwrap();
    assert_eq!(recovered, 1);

    let snapshot = broker.get_order(order_id).await.unwrap();
    assert_eq!(snapshot.state, OrderState::Spawning);
    assert!(snapshot.instance_id.is_some());
    broker.shutdown().await.unwrap();
}
