use std::fs;
use std::io;
use std::path::PathBuf;

use harvest_core::error::HarvestError;
use harvest_core::provisioner::ClusterRecord;
use serde::{Deserialize, Serialize};

use crate::config::expand_tilde;

const STATE_PATH: &str = "~/.harvest/state.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestState {
    pub clusters: Vec<ClusterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEntry {
    #[serde(flatten)]
    pub record: ClusterRecord,
    pub created_at: String,
}

/// Clusters provisioned from this machine, kept in a JSON file.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_path(expand_tilde(STATE_PATH))
    }

    pub fn with_path(path: PathBuf) -> Self {
        StateStore { path }
    }

    /// Load state from the JSON file, or an empty state if there is none yet
    pub fn load(&self) -> Result<HarvestState, HarvestError> {
        if !self.path.exists() {
            return Ok(HarvestState::default());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| HarvestError::io(&self.path, e))?;

        serde_json::from_str(&contents)
            .map_err(|e| HarvestError::io(&self.path, io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    pub fn save(&self, state: &HarvestState) -> Result<(), HarvestError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| HarvestError::io(&self.path, io::Error::new(io::ErrorKind::InvalidData, e)))?;

        fs::write(&self.path, json).map_err(|e| HarvestError::io(&self.path, e))
    }

    pub fn add_cluster(&self, record: ClusterRecord) -> Result<(), HarvestError> {
        let mut state = self.load()?;

        if state.clusters.iter().any(|c| c.record.id == record.id) {
            return Err(HarvestError::Config(format!("Cluster with id '{}' already exists", record.id)));
        }

        state.clusters.push(ClusterEntry {
            record,
            created_at: chrono::Utc::now().to_rfc3339(),
        });
        self.save(&state)
    }

    pub fn remove_cluster(&self, cluster_id: &str) -> Result<(), HarvestError> {
        let mut state = self.load()?;
        let initial_len = state.clusters.len();
        state.clusters.retain(|c| c.record.id != cluster_id);

        if state.clusters.len() == initial_len {
            return Err(HarvestError::Config(format!("Cluster with id '{}' not found", cluster_id)));
        }

        self.save(&state)
    }

    pub fn get_cluster(&self, cluster_id: &str) -> Result<Option<ClusterEntry>, HarvestError> {
        let state = self.load()?;
        Ok(state.clusters.into_iter().find(|c| c.record.id == cluster_id))
    }

    pub fn list_clusters(&self) -> Result<Vec<ClusterEntry>, HarvestError> {
        Ok(self.load()?.clusters)
    }
}
