use crate::state_machine::OrderState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of cloud resource an order requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Compute,
    Network,
    Volume,
    Attachment,
    PublicIp,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compute => write!(f, "compute"),
            Self::Network => write!(f, "network"),
            Self::Volume => write!(f, "volume"),
            Self::Attachment => write!(f, "attachment"),
            Self::PublicIp => write!(f, "public_ip"),
        }
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compute" => Ok(Self::Compute),
            "network" => Ok(Self::Network),
            "volume" => Ok(Self::Volume),
            "attachment" => Ok(Self::Attachment),
            "public_ip" => Ok(Self::PublicIp),
            _ => Err(format!("Invalid resource type: {s}")),
        }
    }
}

/// Identity of the federation user an order was created for. The user may
/// belong to a different provider than the one fulfilling the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationUser {
    pub id: String,
    pub identity_provider: String,
}

impl fmt::Display for FederationUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.identity_provider)
    }
}

/// IP assignment mode for network orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkAllocationMode {
    Dynamic,
    Static,
}

/// Resource-type-specific request parameters, one variant per resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceParameters {
    Compute {
        vcpu: u32,
        ram_mb: u64,
        disk_gb: u64,
        image_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_data: Option<String>,
    },
    Network {
        cidr: String,
        gateway: String,
        allocation_mode: NetworkAllocationMode,
    },
    Volume {
        size_gb: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Attachment {
        compute_order_id: Uuid,
        volume_order_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device: Option<String>,
    },
    PublicIp {
        compute_order_id: Uuid,
    },
}

impl ResourceParameters {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Compute { .. } => ResourceType::Compute,
            Self::Network { .. } => ResourceType::Network,
            Self::Volume { .. } => ResourceType::Volume,
            Self::Attachment { .. } => ResourceType::Attachment,
            Self::PublicIp { .. } => ResourceType::PublicIp,
        }
    }
}

/// Resource amounts actually granted by the provider. May differ from the
/// requested parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcpu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_gb: Option<u64>,
}

/// One tracked resource request moving through the lifecycle state machine.
///
/// Identity, requester, providers and request parameters are immutable after
/// creation. `state` is mutated exclusively by the
/// [`TransitionGuard`](crate::state_machine::TransitionGuard); the remaining
/// mutable fields (instance id, allocation, counters) are written under the
/// same per-order lock the guard uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub requester: FederationUser,
    pub requesting_provider: String,
    pub target_provider: String,
    pub cloud_name: String,
    pub parameters: ResourceParameters,
    state: OrderState,
    /// Provider-assigned identifier; set exactly once per provisioning
    /// attempt when the dispatch succeeds.
    pub instance_id: Option<String>,
    pub actual_allocation: Option<Allocation>,
    /// Authorization denial or dispatch failure reason, retrievable by a
    /// polling caller.
    pub fault_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// When the order entered its current state.
    pub state_entered_at: DateTime<Utc>,
    /// When the order was appended to its current queue; drives stuck-order
    /// detection.
    pub on_queue_timestamp: DateTime<Utc>,
    /// Consecutive failed status checks in the current state.
    pub status_check_failures: u32,
    pub cleanup_attempts: u32,
    pub cleanup_complete: bool,
    /// The active state (SPAWNING or FULFILLED) the order held before
    /// entering UNABLE_TO_CHECK_STATUS; routes recovery back.
    pub previous_active_state: Option<OrderState>,
}

impl Order {
    pub fn new(
        requester: FederationUser,
        requesting_provider: impl Into<String>,
        target_provider: impl Into<String>,
        cloud_name: impl Into<String>,
        parameters: ResourceParameters,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            requester,
            requesting_provider: requesting_provider.into(),
            target_provider: target_provider.into(),
            cloud_name: cloud_name.into(),
            parameters,
            state: OrderState::Open,
            instance_id: None,
            actual_allocation: None,
            fault_message: None,
            created_at: now,
            state_entered_at: now,
            on_queue_timestamp: now,
            status_check_failures: 0,
            cleanup_attempts: 0,
            cleanup_complete: false,
            previous_active_state: None,
        }
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    /// Only the transition guard and the recovery loader may set the state.
    pub(crate) fn set_state(&mut self, state: OrderState) {
        self.state = state;
        self.state_entered_at = Utc::now();
    }

    pub fn resource_type(&self) -> ResourceType {
        self.parameters.resource_type()
    }

    /// Whether this order is fulfilled by the given local provider, as
    /// opposed to being dispatched to a remote federation member.
    pub fn is_local(&self, local_provider_id: &str) -> bool {
        self.target_provider == local_provider_id
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id,
            resource_type: self.resource_type(),
            state: self.state,
            requester: self.requester.clone(),
            requesting_provider: self.requesting_provider.clone(),
            target_provider: self.target_provider.clone(),
            cloud_name: self.cloud_name.clone(),
            parameters: self.parameters.clone(),
            instance_id: self.instance_id.clone(),
            actual_allocation: self.actual_allocation.clone(),
            fault_message: self.fault_message.clone(),
            created_at: self.created_at,
            state_entered_at: self.state_entered_at,
        }
    }
}

/// Immutable read view of an order, handed to API callers and remote peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: Uuid,
    pub resource_type: ResourceType,
    pub state: OrderState,
    pub requester: FederationUser,
    pub requesting_provider: String,
    pub target_provider: String,
    pub cloud_name: String,
    pub parameters: ResourceParameters,
    pub instance_id: Option<String>,
    pub actual_allocation: Option<Allocation>,
    pub fault_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state_entered_at: DateTime<Utc>,
}
