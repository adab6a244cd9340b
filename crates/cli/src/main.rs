use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use harvest_core::error::HarvestError;

mod cluster;
mod config;
mod logging;
mod ls;
mod providers;
mod spinner;
mod state;

use state::StateStore;

#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(about = "Harvest - provision a main node and harvester nodes on an OpenStack cloud")]
struct Args {
    /// Path to the config file
    #[arg(short, long, global = true, default_value = config::CONFIG_PATH)]
    config: String,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch the main node, its volume and the harvesters, then write the inventory
    Provision {
        /// Where to write the inventory (overrides [inventory] path)
        #[arg(short, long)]
        inventory: Option<PathBuf>,
        /// Leave already created resources in place if provisioning fails
        #[arg(long)]
        no_rollback: bool,
    },
    /// List provisioned clusters
    Ls,
    /// Write the inventory of a provisioned cluster again
    Inventory {
        /// The ID of the cluster
        id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Terminate a cluster's instances and delete its volume
    Teardown {
        /// The ID of the cluster
        id: String,
        /// Do not delete the data volume
        #[arg(long)]
        keep_volume: bool,
    },
}

fn run(args: Args) -> Result<(), HarvestError> {
    let config_path = config::expand_tilde(&args.config);
    let store = StateStore::new();

    match args.command {
        Commands::Provision { inventory, no_rollback } => {
            cluster::handle_provision(&config_path, &store, inventory, !no_rollback)
        }
        Commands::Ls => ls::handle_ls_command(&store),
        Commands::Inventory { id, output } => cluster::handle_inventory(&store, &id, output),
        Commands::Teardown { id, keep_volume } => {
            cluster::handle_teardown(&config_path, &store, &id, keep_volume)
        }
    }
}

fn main() {
    let args = Args::parse();
    logging::init_tracing(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
