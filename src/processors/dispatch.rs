use crate::models::Order;
use crate::plugins::{
    CloudCredentials, CloudPlugin, InstanceSnapshot, PluginError, RemoteDispatch,
    RemoteDispatchError, RemoteRequest, RemoteResponse,
};
use std::sync::Arc;
use std::time::Duration;

/// Routes provider operations for an order: through the local cloud plugin
/// when the order targets this provider, through the federation RPC
/// otherwise. Credentials are built per call and never shared across
/// invocations; every remote call is bounded by the configured timeout so a
/// silent federation peer cannot stall a processor pass.
pub struct Dispatcher {
    local_provider: String,
    plugin: Arc<dyn CloudPlugin>,
    remote: Arc<dyn RemoteDispatch>,
    remote_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        local_provider: impl Into<String>,
        plugin: Arc<dyn CloudPlugin>,
        remote: Arc<dyn RemoteDispatch>,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            local_provider: local_provider.into(),
            plugin,
            remote,
            remote_timeout,
        }
    }

    async fn send_remote(
        &self,
        provider: &str,
        request: RemoteRequest,
    ) -> Result<RemoteResponse, PluginError> {
        match tokio::time::timeout(self.remote_timeout, self.remote.send(provider, request)).await
        {
            Ok(result) => result.map_err(remote_to_plugin),
            Err(_) => Err(PluginError::Timeout(self.remote_timeout)),
        }
    }

    pub async fn request(&self, order: &Order) -> Result<String, PluginError> {
        if order.is_local(&self.local_provider) {
            let credentials = CloudCredentials::for_order(order);
            self.plugin.request_instance(order, &credentials).await
        } else {
            let response = self
                .send_remote(
                    &order.target_provider,
                    RemoteRequest::CreateOrder {
                        order: order.snapshot(),
                    },
                )
                .await?;
            response.instance_id.ok_or_else(|| {
                PluginError::Provider("remote provider returned no instance id".to_string())
            })
        }
    }

    pub async fn fetch(&self, order: &Order) -> Result<InstanceSnapshot, PluginError> {
        if order.is_local(&self.local_provider) {
            let credentials = CloudCredentials::for_order(order);
            self.plugin.get_instance(order, &credentials).await
        } else {
            let response = self
                .send_remote(
                    &order.target_provider,
                    RemoteRequest::GetInstance { order_id: order.id },
                )
                .await?;
            response
                .instance
                .ok_or_else(|| PluginError::InstanceNotFound(order.id.to_string()))
        }
    }

    pub async fn delete(&self, order: &Order) -> Result<(), PluginError> {
        if order.is_local(&self.local_provider) {
            let credentials = CloudCredentials::for_order(order);
            self.plugin.delete_instance(order, &credentials).await
        } else {
            self.send_remote(
                &order.target_provider,
                RemoteRequest::DeleteInstance { order_id: order.id },
            )
            .await?;
            Ok(())
        }
    }

    pub fn is_ready(&self, cloud_state: &str) -> bool {
        self.plugin.is_ready(cloud_state)
    }

    pub fn has_failed(&self, cloud_state: &str) -> bool {
        self.plugin.has_failed(cloud_state)
    }
}

fn remote_to_plugin(err: RemoteDispatchError) -> PluginError {
    match err {
        RemoteDispatchError::UnavailableProvider { provider } => {
            PluginError::Unavailable(format!("remote provider {provider}"))
        }
        RemoteDispatchError::Timeout { timeout, .. } => PluginError::Timeout(timeout),
        RemoteDispatchError::Protocol(msg) => PluginError::Provider(msg),
    }
}
