//! # Collaborator Facades
//!
//! Trait seams the broker core consumes: per-cloud plugins, authorization,
//! and the remote federation dispatch. The core is generic over these traits;
//! each backend provides one implementation. REST/SDK mechanics live behind
//! the trait, never in the core.

pub mod emulated;

pub use emulated::EmulatedCloudPlugin;

use crate::models::{Allocation, FederationUser, Order, OrderSnapshot, ResourceType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Point-in-time view of a provider-side instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub instance_id: String,
    /// Provider-reported state string, interpreted through
    /// [`CloudPlugin::is_ready`] / [`CloudPlugin::has_failed`].
    pub cloud_state: String,
    pub allocation: Option<Allocation>,
    pub attributes: HashMap<String, String>,
}

/// Request-scoped credentials for one plugin invocation. Never shared across
/// concurrent calls; each invocation is independently retryable.
#[derive(Debug, Clone)]
pub struct CloudCredentials {
    pub cloud_name: String,
    pub token: Option<String>,
}

impl CloudCredentials {
    pub fn for_order(order: &Order) -> Self {
        Self {
            cloud_name: order.cloud_name.clone(),
            token: None,
        }
    }
}

/// Error taxonomy for cloud plugin calls. Transient errors are retried with
/// a bounded per-order counter; permanent ones move the order immediately.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Provider temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

impl PluginError {
    /// Whether retrying the same call later can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_) | Self::Provider(_))
    }
}

/// Uniform contract every cloud backend implements.
///
/// Implementations route on `order.resource_type()` internally; the broker
/// core stays generic over the backend.
#[async_trait]
pub trait CloudPlugin: Send + Sync {
    /// Request a new instance for the order. Returns the provider-assigned
    /// instance id.
    async fn request_instance(
        &self,
        order: &Order,
        credentials: &CloudCredentials,
    ) -> Result<String, PluginError>;

    /// Fetch the current snapshot of the order's instance.
    async fn get_instance(
        &self,
        order: &Order,
        credentials: &CloudCredentials,
    ) -> Result<InstanceSnapshot, PluginError>;

    /// Delete the order's instance. Deleting an instance that is already
    /// gone is a no-op, so cleanup stays idempotent.
    async fn delete_instance(
        &self,
        order: &Order,
        credentials: &CloudCredentials,
    ) -> Result<(), PluginError>;

    /// Interpret a provider state string as ready-for-use.
    fn is_ready(&self, cloud_state: &str) -> bool;

    /// Interpret a provider state string as unrecoverably failed.
    fn has_failed(&self, cloud_state: &str) -> bool;
}

/// Operation being authorized, checked against the requesting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerOperation {
    Create(ResourceType),
    Get(ResourceType),
    Delete(ResourceType),
}

impl std::fmt::Display for BrokerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create(rt) => write!(f, "create {rt}"),
            Self::Get(rt) => write!(f, "get {rt}"),
            Self::Delete(rt) => write!(f, "delete {rt}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthorizationError {
    #[error("User {user} is not authorized to {operation}")]
    Denied { user: String, operation: String },

    #[error("Authorization could not be evaluated: {0}")]
    Evaluation(String),
}

/// Authorization facade. A `false` return and a [`AuthorizationError::Denied`]
/// error are equivalent denials; processors treat both as a closed order with
/// a recorded reason.
#[async_trait]
pub trait AuthorizationPlugin: Send + Sync {
    async fn is_authorized(
        &self,
        user: &FederationUser,
        operation: &BrokerOperation,
    ) -> Result<bool, AuthorizationError>;
}

/// Request payload for the remote federation RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RemoteRequest {
    CreateOrder { order: OrderSnapshot },
    GetInstance { order_id: Uuid },
    DeleteInstance { order_id: Uuid },
}

/// Response payload from a remote provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub instance_id: Option<String>,
    pub instance: Option<InstanceSnapshot>,
}

#[derive(Error, Debug)]
pub enum RemoteDispatchError {
    #[error("Remote provider unavailable: {provider}")]
    UnavailableProvider { provider: String },

    #[error("Remote call to {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Remote protocol error: {0}")]
    Protocol(String),
}

/// Synchronous request/response RPC to a remote federation member. The
/// dispatcher bounds every call with the configured remote timeout, so
/// implementations do not need their own.
#[async_trait]
pub trait RemoteDispatch: Send + Sync {
    async fn send(
        &self,
        remote_provider: &str,
        request: RemoteRequest,
    ) -> Result<RemoteResponse, RemoteDispatchError>;
}

/// Authorization plugin that allows every operation. Useful for single-tenant
/// deployments and tests.
pub struct AllowAllAuthorization;

#[async_trait]
impl AuthorizationPlugin for AllowAllAuthorization {
    async fn is_authorized(
        &self,
        _user: &FederationUser,
        _operation: &BrokerOperation,
    ) -> Result<bool, AuthorizationError> {
        Ok(true)
    }
}

/// Remote dispatch stub for deployments with no federation peers: every call
/// reports the provider unavailable.
pub struct NoRemoteDispatch;

#[async_trait]
impl RemoteDispatch for NoRemoteDispatch {
    async fn send(
        &self,
        remote_provider: &str,
        _request: RemoteRequest,
    ) -> Result<RemoteResponse, RemoteDispatchError> {
        Err(RemoteDispatchError::UnavailableProvider {
            provider: remote_provider.to_string(),
        })
    }
}
