//! Shared fixtures for processor unit tests: a wired-up context over the
//! emulated cloud and scripted collaborator stubs.

use super::{Dispatcher, ProcessorContext};
use crate::config::BrokerConfig;
use crate::events::OrderEventPublisher;
use crate::models::{FederationUser, Order, ResourceParameters};
use crate::persistence::InMemoryPersistence;
use crate::plugins::{
    AuthorizationError, AuthorizationPlugin, BrokerOperation, CloudCredentials, CloudPlugin,
    EmulatedCloudPlugin, InstanceSnapshot, NoRemoteDispatch, PluginError, RemoteDispatch,
};
use crate::state_machine::TransitionGuard;
use crate::store::OrderStore;
use async_trait::async_trait;
use std::sync::Arc;

pub(crate) struct Harness {
    pub store: Arc<OrderStore>,
    pub guard: Arc<TransitionGuard>,
    pub persistence: Arc<InMemoryPersistence>,
    pub plugin: Arc<dyn CloudPlugin>,
    pub auth: Arc<dyn AuthorizationPlugin>,
    pub remote: Arc<dyn RemoteDispatch>,
    pub config: BrokerConfig,
}

impl Harness {
    pub fn ctx(&self) -> ProcessorContext {
        ProcessorContext {
            store: Arc::clone(&self.store),
            guard: Arc::clone(&self.guard),
            dispatcher: Arc::new(Dispatcher::new(
                self.config.provider_id.clone(),
                Arc::clone(&self.plugin),
                Arc::clone(&self.remote),
                self.config.retries.remote_timeout,
            )),
            auth: Arc::clone(&self.auth),
            persistence: Arc::clone(&self.persistence) as Arc<dyn crate::persistence::OrderPersistence>,
            config: Arc::new(self.config.clone()),
        }
    }
}

pub(crate) fn harness() -> Harness {
    let store = Arc::new(OrderStore::new());
    let persistence = Arc::new(InMemoryPersistence::new());
    let guard = Arc::new(TransitionGuard::new(
        Arc::clone(&store),
        Arc::clone(&persistence) as Arc<dyn crate::persistence::OrderPersistence>,
        OrderEventPublisher::default(),
    ));
    Harness {
        store,
        guard,
        persistence,
        plugin: Arc::new(EmulatedCloudPlugin::new()),
        auth: Arc::new(crate::plugins::AllowAllAuthorization),
        remote: Arc::new(NoRemoteDispatch),
        config: BrokerConfig::for_testing(),
    }
}

/// A local compute order targeting the harness's own provider.
pub(crate) fn test_order(h: &Harness) -> Order {
    Order::new(
        FederationUser {
            id: "grace".to_string(),
            identity_provider: "idp.example.org".to_string(),
        },
        h.config.provider_id.clone(),
        h.config.provider_id.clone(),
        "emulated",
        ResourceParameters::Compute {
            vcpu: 2,
            ram_mb: 2048,
            disk_gb: 20,
            image_id: "ubuntu-24.04".to_string(),
            public_key: None,
            user_data: None,
        },
    )
}

/// Cloud plugin whose every call reports the provider unavailable.
pub(crate) struct UnavailablePlugin;

#[async_trait]
impl CloudPlugin for UnavailablePlugin {
    async fn request_instance(
        &self,
        _order: &Order,
        _credentials: &CloudCredentials,
    ) -> Result<String, PluginError> {
        Err(PluginError::Unavailable("stub".to_string()))
    }

    async fn get_instance(
        &self,
        _order: &Order,
        _credentials: &CloudCredentials,
    ) -> Result<InstanceSnapshot, PluginError> {
        Err(PluginError::Unavailable("stub".to_string()))
    }

    async fn delete_instance(
        &self,
        _order: &Order,
        _credentials: &CloudCredentials,
    ) -> Result<(), PluginError> {
        Err(PluginError::Unavailable("stub".to_string()))
    }

    fn is_ready(&self, _cloud_state: &str) -> bool {
        false
    }

    fn has_failed(&self, _cloud_state: &str) -> bool {
        false
    }
}

pub(crate) fn failing_plugin() -> Arc<dyn CloudPlugin> {
    Arc::new(UnavailablePlugin)
}

/// Authorization plugin that denies every operation.
pub(crate) struct DenyAllAuthorization;

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
