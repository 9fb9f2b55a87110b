use super::{CloudCredentials, CloudPlugin, InstanceSnapshot, PluginError};
use crate::models::{Allocation, Order, ResourceParameters};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

const STATE_SPAWNING: &str = "spawning";
const STATE_READY: &str = "ready";
const STATE_FAILED: &str = "failed";

#[derive(Debug, Clone)]
struct EmulatedInstance {
    cloud_state: String,
    allocation: Allocation,
    polls: u32,
}

/// In-process cloud backend that fabricates instances and walks them through
/// provisioning. Serves as the demo backend and as a deterministic target
/// for processor tests: an instance becomes ready after a configurable
/// number of status polls.
pub struct EmulatedCloudPlugin {
    instances: Mutex<HashMap<String, EmulatedInstance>>,
    polls_until_ready: u32,
}

impl EmulatedCloudPlugin {
    pub fn new() -> Self {
        Self::with_polls_until_ready(1)
    }

    /// Instances report `spawning` for the first `polls_until_ready - 1`
    /// status checks and `ready` from then on.
    pub fn with_polls_until_ready(polls_until_ready: u32) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            polls_until_ready,
        }
    }

    /// Force an instance into the failed state, as a real cloud would after
    /// a hypervisor error.
    pub fn fail_instance(&self, instance_id: &str) {
        if let Some(instance) = self.instances.lock().get_mut(instance_id) {
            instance.cloud_state = STATE_FAILED.to_string();
        }
    }

    /// Drop an instance without going through delete, emulating provider-side
    /// disappearance.
    pub fn vanish_instance(&self, instance_id: &str) {
        self.instances.lock().remove(instance_id);
    }

    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }

    fn allocation_for(parameters: &ResourceParameters) -> Allocation {
        match parameters {
            ResourceParameters::Compute {
                vcpu,
                ram_mb,
                disk_gb,
                ..
            } => Allocation {
                instances: Some(1),
                vcpu: Some(*vcpu),
                ram_mb: Some(*ram_mb),
                disk_gb: Some(*disk_gb),
            },
            ResourceParameters::Volume { size_gb, .. } => Allocation {
                instances: Some(1),
                disk_gb: Some(*size_gb),
                ..Allocation::default()
            },
            _ => Allocation {
                instances: Some(1),
                ..Allocation::default()
            },
        }
    }
}

impl Default for EmulatedCloudPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudPlugin for EmulatedCloudPlugin {
    async fn request_instance(
        &self,
        order: &Order,
        _credentials: &CloudCredentials,
    ) -> Result<String, PluginError> {
        let instance_id = format!("em-{}", Uuid::new_v4());
        self.instances.lock().insert(
            instance_id.clone(),
            EmulatedInstance {
                cloud_state: STATE_SPAWNING.to_string(),
                allocation: Self::allocation_for(&order.parameters),
                polls: 0,
            },
        );
        Ok(instance_id)
    }

    async fn get_instance(
        &self,
        order: &Order,
        _credentials: &CloudCredentials,
    ) -> Result<InstanceSnapshot, PluginError> {
        let instance_id = order
            .instance_id
            .clone()
            .ok_or_else(|| PluginError::InvalidRequest("order has no instance id".to_string()))?;

        let mut instances = self.instances.lock();
        let instance = instances
            .get_mut(&instance_id)
            .ok_or_else(|| PluginError::InstanceNotFound(instance_id.clone()))?;

        instance.polls += 1;
        if instance.cloud_state == STATE_SPAWNING && instance.polls >= self.polls_until_ready {
            instance.cloud_state = STATE_READY.to_string();
        }

        Ok(InstanceSnapshot {
            instance_id,
            cloud_state: instance.cloud_state.clone(),
            allocation: Some(instance.allocation.clone()),
            attributes: HashMap::new(),
        })
    }

    async fn delete_instance(
        &self,
        order: &Order,
        _credentials: &CloudCredentials,
    ) -> Result<(), PluginError> {
        if let Some(instance_id) = &order.instance_id {
            self.instances.lock().remove(instance_id);
        }
        Ok(())
    }

    fn is_ready(&self, cloud_state: &str) -> bool {
        cloud_state == STATE_READY
    }

    fn has_failed(&self, cloud_state: &str) -> bool {
        cloud_state == STATE_FAILED
    }
}
