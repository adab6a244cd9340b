use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Every failure the provisioning workflow can surface. All of them are fatal
/// for the current run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("provisioning rejected: {0}")]
    Provision(String),
    #[error("{resource} {id} not ready after {attempts} attempts ({waited:?})")]
    ProvisionTimeout {
        resource: &'static str,
        id: String,
        attempts: u32,
        waited: Duration,
    },
    #[error("volume attach rejected: {0}")]
    Attach(String),
    #[error("role assignment failed: {0}")]
    Assignment(String),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("teardown failed: {0}")]
    Teardown(String),
}

impl HarvestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarvestError::Io {
            path: path.into(),
            source,
        }
    }
}
