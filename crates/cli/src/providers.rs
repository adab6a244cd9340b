use harvest_core::CloudProvider;
use harvest_core::error::HarvestError;
use harvest_openstack::OpenStack;

use crate::config::Config;

/// Connect to the cloud named in `[cloud] provider`.
pub fn create_provider_handle(config: &Config) -> Result<Box<dyn CloudProvider>, HarvestError> {
    match config.cloud.provider.as_str() {
        "openstack" | "nectar" => {
            let openstack_config = config.openstack()?;
            Ok(Box::new(OpenStack::connect(&openstack_config)?))
        }
        other => Err(HarvestError::Config(format!("Unimplemented provider: {}", other))),
    }
}
