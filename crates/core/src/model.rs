use std::collections::BTreeMap;
use std::fmt;

pub const TAG_CLUSTER: &str = "harvest-cluster";
pub const TAG_ROLE: &str = "harvest-role";
pub const TAG_INDEX: &str = "harvest-index";

pub const ROLE_MAIN: &str = "main";
pub const ROLE_HARVESTER: &str = "harvester";

/// Key/value metadata attached to an instance at launch.
pub type Tags = BTreeMap<String, String>;

/// Desired shape of a single instance. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRequest {
    pub name: String,
    pub image_id: String,
    pub flavor: String,
    pub key_name: String,
    pub security_groups: Vec<String>,
    pub zone: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    Terminated,
    Failed,
}

impl InstanceState {
    pub fn is_running(&self) -> bool {
        matches!(self, InstanceState::Running)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Terminated => "terminated",
            InstanceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Last observed view of a cloud-side instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    pub id: String,
    pub name: String,
    pub state: InstanceState,
    pub ip: Option<String>,
    pub tags: Tags,
}

impl InstanceHandle {
    /// Position of a harvester within its cluster, taken from the launch tags.
    pub fn harvester_index(&self) -> Option<usize> {
        self.tags.get(TAG_INDEX).and_then(|v| v.parse().ok())
    }

    pub fn role(&self) -> Option<&str> {
        self.tags.get(TAG_ROLE).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRequest {
    pub name: String,
    pub size_gb: u32,
    pub zone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeState {
    Creating,
    Available,
    InUse,
    Deleting,
    Failed,
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeState::Creating => "creating",
            VolumeState::Available => "available",
            VolumeState::InUse => "in-use",
            VolumeState::Deleting => "deleting",
            VolumeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHandle {
    pub id: String,
    pub state: VolumeState,
}

/// Every instance of a cluster is named with this prefix.
pub fn instance_name_prefix(cluster_id: &str) -> String {
    format!("harvest-{}-", cluster_id)
}

/// Tags for the instances of one cluster.
pub fn cluster_tags(cluster_id: &str, role: &str, index: Option<usize>) -> Tags {
    let mut tags = Tags::new();
    tags.insert(TAG_CLUSTER.to_string(), cluster_id.to_string());
    tags.insert(TAG_ROLE.to_string(), role.to_string());
    if let Some(index) = index {
        tags.insert(TAG_INDEX.to_string(), index.to_string());
    }
    tags
}
