use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use harvest_core::error::HarvestError;
use harvest_core::poll::PollPolicy;
use harvest_core::provisioner::ClusterSpec;
use harvest_openstack::OpenStackConfig;
use serde::Deserialize;
use tracing::debug;

pub const CONFIG_PATH: &str = "~/.harvest/config.toml";

const ENV_CREDENTIAL_ID: &str = "HARVEST_CREDENTIAL_ID";
const ENV_CREDENTIAL_SECRET: &str = "HARVEST_CREDENTIAL_SECRET";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub cloud: CloudConfig,
    pub credentials: Credentials,
    pub cluster: ClusterConfig,
    pub volume: VolumeConfig,
    pub inventory: InventoryConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CloudConfig {
    pub provider: String,
    pub region: String,
    pub auth_host: String,
    pub auth_port: u16,
    pub auth_path: String,
    pub verify_tls: bool,
}

impl Default for CloudConfig {
    fn default() -> Self {
        CloudConfig {
            provider: "openstack".to_string(),
            region: "melbourne".to_string(),
            auth_host: "keystone.rc.nectar.org.au".to_string(),
            auth_port: 5000,
            auth_path: String::new(),
            verify_tls: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub id: Option<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClusterConfig {
    pub image: Option<String>,
    pub key_name: String,
    pub security_groups: Vec<String>,
    pub zone: String,
    pub main_flavor: String,
    pub harvester_flavor: String,
    pub harvester_count: usize,
    pub providers: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            image: None,
            key_name: "Cloud".to_string(),
            security_groups: vec!["default".to_string(), "SSH".to_string(), "CouchDB".to_string()],
            zone: "melbourne-np".to_string(),
            main_flavor: "m1.large".to_string(),
            harvester_flavor: "m1.small".to_string(),
            harvester_count: 3,
            providers: vec!["VodafoneAU".to_string(), "Telstra".to_string(), "Optus".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VolumeConfig {
    pub size_gb: u32,
    pub device: String,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        VolumeConfig {
            size_gb: 200,
            device: "/dev/vdc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub path: PathBuf,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        InventoryConfig {
            path: PathBuf::from("/etc/ansible/hosts"),
        }
    }
}

/// Durations are humantime strings, e.g. "1s", "10m", "1h 30m".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval: String,
    pub timeout: String,
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            interval: "1s".to_string(),
            timeout: "10m".to_string(),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Read the config file, apply credential overrides from the environment
    /// and validate the result.
    pub fn load(path: &Path) -> Result<Config, HarvestError> {
        debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Config::from_toml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Config, HarvestError> {
        toml::from_str(content).map_err(|e| HarvestError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup(ENV_CREDENTIAL_ID) {
            self.credentials.id = Some(id);
        }
        if let Some(secret) = lookup(ENV_CREDENTIAL_SECRET) {
            self.credentials.secret = Some(secret);
        }
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.cluster.harvester_count != self.cluster.providers.len() {
            return Err(HarvestError::Config(format!(
                "harvester-count is {} but {} providers are listed",
                self.cluster.harvester_count,
                self.cluster.providers.len()
            )));
        }
        if self.polling_interval()?.is_zero() {
            return Err(HarvestError::Config("polling interval must be greater than zero".into()));
        }
        self.polling_timeout()?;
        Ok(())
    }

    pub fn polling_interval(&self) -> Result<Duration, HarvestError> {
        parse_duration("polling.interval", &self.polling.interval)
    }

    pub fn polling_timeout(&self) -> Result<Duration, HarvestError> {
        parse_duration("polling.timeout", &self.polling.timeout)
    }

    pub fn poll_policy(&self) -> Result<PollPolicy, HarvestError> {
        Ok(PollPolicy::from_timeout(self.polling_interval()?, self.polling_timeout()?))
    }

    pub fn openstack(&self) -> Result<OpenStackConfig, HarvestError> {
        let credential_id = required(&self.credentials.id, "credentials.id", ENV_CREDENTIAL_ID)?;
        let credential_secret = required(&self.credentials.secret, "credentials.secret", ENV_CREDENTIAL_SECRET)?;
        Ok(OpenStackConfig {
            region: self.cloud.region.clone(),
            auth_host: self.cloud.auth_host.clone(),
            auth_port: self.cloud.auth_port,
            auth_path: self.cloud.auth_path.clone(),
            credential_id,
            credential_secret,
            verify_tls: self.cloud.verify_tls,
        })
    }

    pub fn cluster_spec(&self, inventory: Option<PathBuf>, rollback: bool) -> Result<ClusterSpec, HarvestError> {
        let image_id = self
            .cluster
            .image
            .clone()
            .ok_or_else(|| HarvestError::Config("cluster.image is required, set it in your harvest config".into()))?;
        Ok(ClusterSpec {
            image_id,
            key_name: self.cluster.key_name.clone(),
            security_groups: self.cluster.security_groups.clone(),
            zone: self.cluster.zone.clone(),
            main_flavor: self.cluster.main_flavor.clone(),
            harvester_flavor: self.cluster.harvester_flavor.clone(),
            harvester_count: self.cluster.harvester_count,
            provider_labels: self.cluster.providers.clone(),
            volume_size_gb: self.volume.size_gb,
            volume_device: self.volume.device.clone(),
            inventory_path: inventory.unwrap_or_else(|| self.inventory.path.clone()),
            poll: self.poll_policy()?,
            rollback,
        })
    }
}

fn required(value: &Option<String>, key: &str, env: &str) -> Result<String, HarvestError> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HarvestError::Config(format!("{} is required, set it in your harvest config or {}", key, env)))
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, HarvestError> {
    humantime::parse_duration(value)
        .map_err(|e| HarvestError::Config(format!("Invalid duration for {}: '{}' ({})", key, value, e)))
}
