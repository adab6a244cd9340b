use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use crate::CloudProvider;
use crate::error::HarvestError;
use crate::model::{
    InstanceHandle, InstanceRequest, InstanceState, TAG_CLUSTER, VolumeHandle, VolumeRequest,
    VolumeState,
};

struct FakeInstance {
    handle: InstanceHandle,
    script: VecDeque<InstanceState>,
}

/// Scripted in-memory cloud. Each launched instance walks through
/// `instance_script` one state per describe call and stays on the last one.
/// Instance `n` (zero based, launch order) gets address `10.0.0.{n+1}`.
pub struct FakeCloud {
    instances: RefCell<Vec<FakeInstance>>,
    volumes: RefCell<Vec<(VolumeHandle, VecDeque<VolumeState>)>>,
    describe_calls: RefCell<HashMap<String, u32>>,
    pub instance_script: RefCell<Vec<InstanceState>>,
    pub volume_script: RefCell<Vec<VolumeState>>,
    pub reverse_listing: Cell<bool>,
    pub fail_launch_at: Cell<Option<usize>>,
    pub fail_attach: Cell<bool>,
    pub fail_describe_of: RefCell<Option<String>>,
    pub terminated: RefCell<Vec<String>>,
    pub deleted_volumes: RefCell<Vec<String>>,
    pub attachments: RefCell<Vec<(String, String, String)>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        FakeCloud {
            instances: RefCell::new(Vec::new()),
            volumes: RefCell::new(Vec::new()),
            describe_calls: RefCell::new(HashMap::new()),
            instance_script: RefCell::new(vec![InstanceState::Running]),
            volume_script: RefCell::new(vec![VolumeState::Available]),
            reverse_listing: Cell::new(false),
            fail_launch_at: Cell::new(None),
            fail_attach: Cell::new(false),
            fail_describe_of: RefCell::new(None),
            terminated: RefCell::new(Vec::new()),
            deleted_volumes: RefCell::new(Vec::new()),
            attachments: RefCell::new(Vec::new()),
        }
    }

    pub fn describe_count(&self, id: &str) -> u32 {
        self.describe_calls.borrow().get(id).copied().unwrap_or(0)
    }

    pub fn launched(&self) -> usize {
        self.instances.borrow().len()
    }

    fn record_describe(&self, id: &str) {
        *self.describe_calls.borrow_mut().entry(id.to_string()).or_insert(0) += 1;
    }
}

fn advance<T: Copy>(script: &mut VecDeque<T>) -> Option<T> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().copied()
    }
}

fn with_ip(mut handle: InstanceHandle, index: usize) -> InstanceHandle {
    handle.ip = handle
        .state
        .is_running()
        .then(|| format!("10.0.0.{}", index + 1));
    handle
}

impl CloudProvider for FakeCloud {
    fn launch_instance(&self, request: &InstanceRequest) -> Result<InstanceHandle, HarvestError> {
        let index = self.launched();
        if self.fail_launch_at.get() == Some(index) {
            return Err(HarvestError::Provision("quota exceeded".into()));
        }
        let handle = InstanceHandle {
            id: format!("i-{}", index),
            name: request.name.clone(),
            state: InstanceState::Pending,
            ip: None,
            tags: request.tags.clone(),
        };
        self.instances.borrow_mut().push(FakeInstance {
            handle: handle.clone(),
            script: self.instance_script.borrow().iter().copied().collect(),
        });
        Ok(handle)
    }

    fn describe_instance(&self, id: &str) -> Result<InstanceHandle, HarvestError> {
        self.record_describe(id);
        if self.fail_describe_of.borrow().as_deref() == Some(id) {
            return Err(HarvestError::Provision(format!("API Error (503) describing {}", id)));
        }
        let mut instances = self.instances.borrow_mut();
        let (index, instance) = instances
            .iter_mut()
            .enumerate()
            .find(|(_, i)| i.handle.id == id)
            .ok_or_else(|| HarvestError::Provision(format!("no instance {}", id)))?;
        if let Some(state) = advance(&mut instance.script) {
            instance.handle.state = state;
        }
        Ok(with_ip(instance.handle.clone(), index))
    }

    fn list_instances(&self, cluster_id: &str) -> Result<Vec<InstanceHandle>, HarvestError> {
        let instances = self.instances.borrow();
        let mut listed: Vec<InstanceHandle> = instances
            .iter()
            .enumerate()
            .filter(|(_, i)| {
                i.handle.tags.get(TAG_CLUSTER).map(String::as_str) == Some(cluster_id)
            })
            .map(|(index, i)| with_ip(i.handle.clone(), index))
            .collect();
        if self.reverse_listing.get() {
            listed.reverse();
        }
        Ok(listed)
    }

    fn terminate_instance(&self, id: &str) -> Result<(), HarvestError> {
        self.terminated.borrow_mut().push(id.to_string());
        Ok(())
    }

    fn create_volume(&self, _request: &VolumeRequest) -> Result<VolumeHandle, HarvestError> {
        let mut volumes = self.volumes.borrow_mut();
        let handle = VolumeHandle {
            id: format!("vol-{}", volumes.len()),
            state: VolumeState::Creating,
        };
        volumes.push((handle.clone(), self.volume_script.borrow().iter().copied().collect()));
        Ok(handle)
    }

    fn describe_volume(&self, id: &str) -> Result<VolumeHandle, HarvestError> {
        self.record_describe(id);
        let mut volumes = self.volumes.borrow_mut();
        let (handle, script) = volumes
            .iter_mut()
            .find(|(v, _)| v.id == id)
            .ok_or_else(|| HarvestError::Provision(format!("no volume {}", id)))?;
        if let Some(state) = advance(script) {
            handle.state = state;
        }
        Ok(handle.clone())
    }

    fn attach_volume(&self, volume_id: &str, instance_id: &str, device: &str) -> Result<(), HarvestError> {
        if self.fail_attach.get() {
            return Err(HarvestError::Attach("instance is not accepting block devices".into()));
        }
        self.attachments.borrow_mut().push((
            volume_id.to_string(),
            instance_id.to_string(),
            device.to_string(),
        ));
        Ok(())
    }

    fn delete_volume(&self, id: &str) -> Result<(), HarvestError> {
        self.deleted_volumes.borrow_mut().push(id.to_string());
        Ok(())
    }
}
