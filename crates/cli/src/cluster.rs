use std::path::{Path, PathBuf};

use harvest_core::error::HarvestError;
use harvest_core::provisioner::{teardown, Provisioner};
use indicatif::ProgressBar;
use tracing::warn;

use crate::config::Config;
use crate::providers;
use crate::spinner::create_spinner;
use crate::state::StateStore;

pub fn handle_provision(
    config_path: &Path,
    store: &StateStore,
    inventory: Option<PathBuf>,
    rollback: bool,
) -> Result<(), HarvestError> {
    let spinner = create_spinner();
    clear_on_error(&spinner, provision(&spinner, config_path, store, inventory, rollback))
}

fn provision(
    spinner: &ProgressBar,
    config_path: &Path,
    store: &StateStore,
    inventory: Option<PathBuf>,
    rollback: bool,
) -> Result<(), HarvestError> {
    spinner.set_message("Parsing configuration...");
    let config = Config::load(config_path)?;
    let spec = config.cluster_spec(inventory, rollback)?;

    // Fail on a corrupt state file before any resource exists.
    store.load()?;

    spinner.set_message(format!("Connecting to {} in region {}...", config.cloud.provider, config.cloud.region));
    let provider = providers::create_provider_handle(&config)?;

    let record = Provisioner::new(provider.as_ref(), spec)
        .with_observer(|message| spinner.set_message(message.to_string()))
        .run()?;

    spinner.set_message("Updating state...");
    if let Err(e) = store.add_cluster(record.clone()) {
        let harvesters: Vec<&str> = record.harvesters.iter().map(|h| h.id.as_str()).collect();
        warn!(
            cluster = %record.id,
            main = %record.main.id,
            harvesters = ?harvesters,
            volume = %record.volume_id,
            error = %e,
            "cluster is running but could not be recorded"
        );
        spinner.suspend(|| {
            eprintln!(
                "Cluster {} is running but was not saved to state: main {}, harvesters {}, volume {}",
                record.id,
                record.main.id,
                harvesters.join(", "),
                record.volume_id
            )
        });
        return Err(e);
    }

    spinner.finish_with_message(format!("Cluster {} provisioned!", record.id));
    println!("Inventory written to {}", record.inventory_path.display());
    Ok(())
}

pub fn handle_teardown(
    config_path: &Path,
    store: &StateStore,
    cluster_id: &str,
    keep_volume: bool,
) -> Result<(), HarvestError> {
    let spinner = create_spinner();
    clear_on_error(&spinner, tear_down(&spinner, config_path, store, cluster_id, keep_volume))
}

fn tear_down(
    spinner: &ProgressBar,
    config_path: &Path,
    store: &StateStore,
    cluster_id: &str,
    keep_volume: bool,
) -> Result<(), HarvestError> {
    spinner.set_message("Locating cluster...");
    let entry = store
        .get_cluster(cluster_id)?
        .ok_or_else(|| HarvestError::Config(format!("Cluster with ID '{}' not found", cluster_id)))?;

    spinner.set_message("Parsing configuration...");
    let config = Config::load(config_path)?;
    let poll = config.poll_policy()?;

    spinner.set_message("Tearing down cluster...");
    let provider = providers::create_provider_handle(&config)?;
    teardown(provider.as_ref(), &entry.record, !keep_volume, poll)?;

    spinner.set_message("Removing from state...");
    store.remove_cluster(cluster_id)?;

    spinner.finish_with_message("Cluster deleted successfully!");
    Ok(())
}

fn clear_on_error<T>(spinner: &ProgressBar, result: Result<T, HarvestError>) -> Result<T, HarvestError> {
    if result.is_err() {
        spinner.finish_and_clear();
    }
    result
}

/// Re-render the inventory of a recorded cluster, by default to where it was
/// first written.
pub fn handle_inventory(store: &StateStore, cluster_id: &str, output: Option<PathBuf>) -> Result<(), HarvestError> {
    let entry = store
        .get_cluster(cluster_id)?
        .ok_or_else(|| HarvestError::Config(format!("Cluster with ID '{}' not found", cluster_id)))?;

    let path = output.unwrap_or_else(|| entry.record.inventory_path.clone());
    entry.record.inventory().write(&path)?;

    println!("Inventory written to {}", path.display());
    Ok(())
}
