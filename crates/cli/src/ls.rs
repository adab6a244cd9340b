use chrono::DateTime;
use comfy_table::{Cell, Table};
use harvest_core::error::HarvestError;

use crate::state::{ClusterEntry, StateStore};

pub fn handle_ls_command(store: &StateStore) -> Result<(), HarvestError> {
    let clusters = store.list_clusters()?;

    if clusters.is_empty() {
        println!("No clusters found.");
    } else {
        println!("Clusters");
        println!("{}", cluster_table(&clusters));
    }
    Ok(())
}

fn cluster_table(clusters: &[ClusterEntry]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Main IP", "Harvesters", "Volume", "Inventory", "Created At"]);

    for cluster in clusters {
        // Format the created_at timestamp to be more readable
        let created_at = match DateTime::parse_from_rfc3339(&cluster.created_at) {
            Ok(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            Err(_) => cluster.created_at.clone(),
        };

        let harvesters = cluster
            .record
            .harvesters
            .iter()
            .map(|h| format!("{} ({})", h.ip, h.provider))
            .collect::<Vec<_>>()
            .join("\n");

        table.add_row(vec![
            Cell::new(&cluster.record.id),
            Cell::new(&cluster.record.main.ip),
            Cell::new(harvesters),
            Cell::new(&cluster.record.volume_id),
            Cell::new(cluster.record.inventory_path.display()),
            Cell::new(created_at),
        ]);
    }
    table
}
