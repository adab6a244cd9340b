use std::time::{Duration, Instant};

use tracing::debug;

use crate::CloudProvider;
use crate::error::HarvestError;
use crate::model::{InstanceHandle, InstanceState, VolumeHandle, VolumeState};

/// How often and for how long to re-query a resource before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        PollPolicy {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Enough attempts at `interval` to cover `timeout`, and always at least one.
    pub fn from_timeout(interval: Duration, timeout: Duration) -> Self {
        let attempts = if interval.is_zero() {
            1
        } else {
            timeout.as_nanos().div_ceil(interval.as_nanos())
        };
        Self::new(interval, u32::try_from(attempts).unwrap_or(u32::MAX))
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_timeout(Duration::from_secs(1), Duration::from_secs(600))
    }
}

/// Re-describe `handle` until the provider reports it running.
///
/// Returns the refreshed handle from the first running observation. A failed
/// or terminated instance is reported straight away instead of waiting out
/// the policy.
pub fn poll_until_running(
    provider: &dyn CloudProvider,
    handle: &InstanceHandle,
    policy: PollPolicy,
) -> Result<InstanceHandle, HarvestError> {
    let started = Instant::now();

    for attempt in 1..=policy.max_attempts {
        let current = provider.describe_instance(&handle.id)?;
        debug!(instance = %current.id, state = %current.state, attempt, "polled instance");

        match current.state {
            InstanceState::Running => return Ok(current),
            InstanceState::Failed | InstanceState::Terminated => {
                return Err(HarvestError::Provision(format!(
                    "instance {} entered state {} while waiting for it to run",
                    current.id, current.state
                )));
            }
            InstanceState::Pending => {}
        }

        if attempt < policy.max_attempts {
            std::thread::sleep(policy.interval);
        }
    }

    Err(HarvestError::ProvisionTimeout {
        resource: "instance",
        id: handle.id.clone(),
        attempts: policy.max_attempts,
        waited: started.elapsed(),
    })
}

/// Re-describe a volume until it can be attached (or deleted).
pub fn poll_until_volume_available(
    provider: &dyn CloudProvider,
    volume: &VolumeHandle,
    policy: PollPolicy,
) -> Result<VolumeHandle, HarvestError> {
    let started = Instant::now();

    for attempt in 1..=policy.max_attempts {
        let current = provider.describe_volume(&volume.id)?;
        debug!(volume = %current.id, state = %current.state, attempt, "polled volume");

        match current.state {
            VolumeState::Available => return Ok(current),
            VolumeState::Failed => {
                return Err(HarvestError::Provision(format!(
                    "volume {} failed to provision",
                    current.id
                )));
            }
            VolumeState::Creating | VolumeState::InUse | VolumeState::Deleting => {}
        }

        if attempt < policy.max_attempts {
            std::thread::sleep(policy.interval);
        }
    }

    Err(HarvestError::ProvisionTimeout {
        resource: "volume",
        id: volume.id.clone(),
        attempts: policy.max_attempts,
        waited: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InstanceRequest, Tags, VolumeRequest};
    use crate::testing::FakeCloud;

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(Duration::ZERO, max_attempts)
    }

    fn launch(cloud: &FakeCloud) -> InstanceHandle {
        let request = InstanceRequest {
            name: "main".into(),
            image_id: "ami-00003840".into(),
            flavor: "m1.large".into(),
            key_name: "Cloud".into(),
            security_groups: vec!["default".into()],
            zone: "melbourne-np".into(),
            tags: Tags::new(),
        };
        cloud.launch_instance(&request).unwrap()
    }

    #[test]
    fn polls_until_running_then_stops() {
        let cloud = FakeCloud::new();
        *cloud.instance_script.borrow_mut() = vec![
            InstanceState::Pending,
            InstanceState::Pending,
            InstanceState::Running,
        ];
        let handle = launch(&cloud);

        let running = poll_until_running(&cloud, &handle, fast(10)).unwrap();

        assert_eq!(running.state, InstanceState::Running);
        assert_eq!(running.ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(cloud.describe_count(&handle.id), 3);
    }

    #[test]
    fn never_running_times_out_after_max_attempts() {
        let cloud = FakeCloud::new();
        *cloud.instance_script.borrow_mut() = vec![InstanceState::Pending];
        let handle = launch(&cloud);

        let err = poll_until_running(&cloud, &handle, fast(4)).unwrap_err();

        match err {
            HarvestError::ProvisionTimeout { attempts, id, .. } => {
                assert_eq!(attempts, 4);
                assert_eq!(id, handle.id);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(cloud.describe_count(&handle.id), 4);
    }

    #[test]
    fn failed_instance_is_reported_without_waiting() {
        let cloud = FakeCloud::new();
        *cloud.instance_script.borrow_mut() = vec![InstanceState::Pending, InstanceState::Failed];
        let handle = launch(&cloud);

        let err = poll_until_running(&cloud, &handle, fast(50)).unwrap_err();

        assert!(matches!(err, HarvestError::Provision(_)));
        assert_eq!(cloud.describe_count(&handle.id), 2);
    }

    #[test]
    fn volume_waits_for_available() {
        let cloud = FakeCloud::new();
        *cloud.volume_script.borrow_mut() = vec![VolumeState::Creating, VolumeState::Available];
        let volume = cloud
            .create_volume(&VolumeRequest {
                name: "data".into(),
                size_gb: 200,
                zone: "melbourne-np".into(),
            })
            .unwrap();

        let ready = poll_until_volume_available(&cloud, &volume, fast(5)).unwrap();

        assert_eq!(ready.state, VolumeState::Available);
        assert_eq!(cloud.describe_count(&volume.id), 2);
    }

    #[test]
    fn policy_from_timeout_rounds_up() {
        let policy = PollPolicy::from_timeout(Duration::from_secs(3), Duration::from_secs(10));
        assert_eq!(policy.max_attempts, 4);

        let policy = PollPolicy::from_timeout(Duration::from_secs(1), Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }
}
