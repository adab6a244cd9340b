use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::CloudProvider;
use crate::error::HarvestError;
use crate::inventory::InventoryDocument;
use crate::model::{
    InstanceHandle, InstanceRequest, ROLE_HARVESTER, ROLE_MAIN, VolumeHandle, VolumeRequest,
    VolumeState, cluster_tags, instance_name_prefix,
};
use crate::poll::{PollPolicy, poll_until_running, poll_until_volume_available};
use crate::roles::assign_roles;

/// Upper bound on how long rollback waits for a volume to settle before
/// giving up on deleting it.
const ROLLBACK_VOLUME_ATTEMPTS: u32 = 30;

/// Everything needed to stand up one cluster.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub image_id: String,
    pub key_name: String,
    pub security_groups: Vec<String>,
    pub zone: String,
    pub main_flavor: String,
    pub harvester_flavor: String,
    pub harvester_count: usize,
    pub provider_labels: Vec<String>,
    pub volume_size_gb: u32,
    pub volume_device: String,
    pub inventory_path: PathBuf,
    pub poll: PollPolicy,
    pub rollback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvesterRecord {
    pub id: String,
    pub ip: String,
    pub provider: String,
}

/// What a successful run created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: String,
    pub main: NodeRecord,
    pub volume_id: String,
    pub harvesters: Vec<HarvesterRecord>,
    pub inventory_path: PathBuf,
}

impl ClusterRecord {
    pub fn inventory(&self) -> InventoryDocument {
        InventoryDocument {
            main_ip: self.main.ip.clone(),
            harvesters: self
                .harvesters
                .iter()
                .map(|h| (h.ip.clone(), h.provider.clone()))
                .collect(),
        }
    }
}

/// Resources created so far in this run, for rollback.
#[derive(Debug, Default)]
struct Created {
    instances: Vec<String>,
    volume: Option<String>,
}

/// Runs the provisioning workflow once against a provider.
pub struct Provisioner<'a> {
    provider: &'a dyn CloudProvider,
    spec: ClusterSpec,
    observer: Option<Box<dyn Fn(&str) + 'a>>,
}

impl<'a> Provisioner<'a> {
    pub fn new(provider: &'a dyn CloudProvider, spec: ClusterSpec) -> Self {
        Provisioner {
            provider,
            spec,
            observer: None,
        }
    }

    /// Receive a short message at the start of each step.
    pub fn with_observer(mut self, observer: impl Fn(&str) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn step(&self, message: &str) {
        info!("{}", message);
        if let Some(observer) = &self.observer {
            observer(message);
        }
    }

    /// Provision the cluster and write its inventory.
    ///
    /// On failure, anything launched so far is torn down first when rollback
    /// is enabled, then the original error is returned.
    pub fn run(&self) -> Result<ClusterRecord, HarvestError> {
        if self.spec.harvester_count != self.spec.provider_labels.len() {
            return Err(HarvestError::Config(format!(
                "harvester count {} does not match {} provider labels",
                self.spec.harvester_count,
                self.spec.provider_labels.len()
            )));
        }

        let cluster_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let mut created = Created::default();

        match self.provision(&cluster_id, &mut created) {
            Ok(record) => Ok(record),
            Err(e) => {
                if self.spec.rollback {
                    self.rollback(&created);
                } else if !created.instances.is_empty() || created.volume.is_some() {
                    warn!(
                        cluster = %cluster_id,
                        instances = ?created.instances,
                        volume = ?created.volume,
                        "rollback disabled, leaving resources in place"
                    );
                }
                Err(e)
            }
        }
    }

    fn provision(&self, cluster_id: &str, created: &mut Created) -> Result<ClusterRecord, HarvestError> {
        let spec = &self.spec;

        self.step("Launching main instance...");
        let main = self.launch(
            cluster_id,
            format!("{}main", instance_name_prefix(cluster_id)),
            &spec.main_flavor,
            ROLE_MAIN,
            None,
            created,
        )?;

        self.step("Creating storage volume...");
        let volume = self.provider.create_volume(&VolumeRequest {
            name: format!("{}data", instance_name_prefix(cluster_id)),
            size_gb: spec.volume_size_gb,
            zone: spec.zone.clone(),
        })?;
        created.volume = Some(volume.id.clone());
        info!(volume = %volume.id, size_gb = spec.volume_size_gb, "volume requested");

        self.step("Waiting for main instance to run...");
        let main = poll_until_running(self.provider, &main, spec.poll)?;
        let main_ip = main.ip.clone().ok_or_else(|| {
            HarvestError::Provision(format!("main instance {} is running without an address", main.id))
        })?;

        self.step("Attaching volume to main instance...");
        let volume: VolumeHandle = poll_until_volume_available(self.provider, &volume, spec.poll)?;
        self.provider
            .attach_volume(&volume.id, &main.id, &spec.volume_device)?;
        info!(volume = %volume.id, instance = %main.id, device = %spec.volume_device, "volume attached");

        let mut harvesters = Vec::with_capacity(spec.harvester_count);
        for index in 0..spec.harvester_count {
            self.step(&format!("Launching harvester instance {}...", index + 1));
            harvesters.push(self.launch(
                cluster_id,
                format!("{}harvester-{}", instance_name_prefix(cluster_id), index + 1),
                &spec.harvester_flavor,
                ROLE_HARVESTER,
                Some(index),
                created,
            )?);
        }

        self.step("Waiting for harvesters to run...");
        for harvester in &harvesters {
            poll_until_running(self.provider, harvester, spec.poll)?;
        }

        let instances = self.provider.list_instances(cluster_id)?;
        let roles = assign_roles(&instances, &main, &spec.provider_labels)?;

        self.step("Writing inventory...");
        InventoryDocument::new(main_ip.clone(), &roles).write(&spec.inventory_path)?;

        Ok(ClusterRecord {
            id: cluster_id.to_string(),
            main: NodeRecord {
                id: main.id,
                ip: main_ip,
            },
            volume_id: volume.id,
            harvesters: roles
                .harvesters
                .into_iter()
                .map(|h| HarvesterRecord {
                    id: h.instance_id,
                    ip: h.ip,
                    provider: h.label,
                })
                .collect(),
            inventory_path: spec.inventory_path.clone(),
        })
    }

    fn launch(
        &self,
        cluster_id: &str,
        name: String,
        flavor: &str,
        role: &str,
        index: Option<usize>,
        created: &mut Created,
    ) -> Result<InstanceHandle, HarvestError> {
        let request = InstanceRequest {
            name,
            image_id: self.spec.image_id.clone(),
            flavor: flavor.to_string(),
            key_name: self.spec.key_name.clone(),
            security_groups: self.spec.security_groups.clone(),
            zone: self.spec.zone.clone(),
            tags: cluster_tags(cluster_id, role, index),
        };
        let handle = self.provider.launch_instance(&request)?;
        created.instances.push(handle.id.clone());
        info!(instance = %handle.id, name = %handle.name, role, "instance launched");
        Ok(handle)
    }

    fn rollback(&self, created: &Created) {
        if created.instances.is_empty() && created.volume.is_none() {
            return;
        }
        self.step("Rolling back launched resources...");

        for id in created.instances.iter().rev() {
            match self.provider.terminate_instance(id) {
                Ok(()) => info!(instance = %id, "terminated during rollback"),
                Err(e) => warn!(instance = %id, error = %e, "failed to terminate during rollback"),
            }
        }

        // A volume still attaching or attached cannot be deleted yet. One that
        // failed to provision can be deleted straight away.
        if let Some(id) = &created.volume {
            let policy = PollPolicy::new(
                self.spec.poll.interval,
                self.spec.poll.max_attempts.min(ROLLBACK_VOLUME_ATTEMPTS),
            );
            let ready = self.provider.describe_volume(id).and_then(|v| match v.state {
                VolumeState::Failed => Ok(v),
                _ => poll_until_volume_available(self.provider, &v, policy),
            });
            match ready.and_then(|_| self.provider.delete_volume(id)) {
                Ok(()) => info!(volume = %id, "deleted during rollback"),
                Err(e) => warn!(volume = %id, error = %e, "failed to delete volume during rollback"),
            }
        }
    }
}

/// Terminate every instance of a recorded cluster, harvesters first, then
/// optionally delete its volume once the cloud reports it detached.
pub fn teardown(
    provider: &dyn CloudProvider,
    record: &ClusterRecord,
    delete_volume: bool,
    poll: PollPolicy,
) -> Result<(), HarvestError> {
    for id in record
        .harvesters
        .iter()
        .map(|h| &h.id)
        .chain(std::iter::once(&record.main.id))
    {
        provider.terminate_instance(id)?;
        info!(cluster = %record.id, instance = %id, "instance terminated");
    }

    if delete_volume {
        let volume = provider.describe_volume(&record.volume_id)?;
        let volume = poll_until_volume_available(provider, &volume, poll)?;
        provider.delete_volume(&volume.id)?;
        info!(cluster = %record.id, volume = %volume.id, "volume deleted");
    }
    Ok(())
}
