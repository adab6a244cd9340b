pub mod error;
pub mod inventory;
pub mod model;
pub mod poll;
pub mod provisioner;
pub mod roles;

#[cfg(test)]
pub(crate) mod testing;

use error::HarvestError;
use model::{InstanceHandle, InstanceRequest, VolumeHandle, VolumeRequest};

/// The minimal control-plane surface the provisioner depends on. Any cloud
/// that can launch, describe and terminate instances and manage block volumes
/// can stand behind it.
pub trait CloudProvider {
    fn launch_instance(&self, request: &InstanceRequest) -> Result<InstanceHandle, HarvestError>;
    fn describe_instance(&self, id: &str) -> Result<InstanceHandle, HarvestError>;
    /// All instances tagged with `cluster_id`, in the order the provider reports them.
    fn list_instances(&self, cluster_id: &str) -> Result<Vec<InstanceHandle>, HarvestError>;
    fn terminate_instance(&self, id: &str) -> Result<(), HarvestError>;

    fn create_volume(&self, request: &VolumeRequest) -> Result<VolumeHandle, HarvestError>;
    fn describe_volume(&self, id: &str) -> Result<VolumeHandle, HarvestError>;
    fn attach_volume(&self, volume_id: &str, instance_id: &str, device: &str) -> Result<(), HarvestError>;
    fn delete_volume(&self, id: &str) -> Result<(), HarvestError>;
}
