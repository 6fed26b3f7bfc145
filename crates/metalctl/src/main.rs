use std::path::PathBuf;

use clap::{Parser, Subcommand};
use metal_core::{Liveliness, MetalConfig};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "metalctl",
    about = "Bare-metal machine allocation",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to metal.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Override the store path from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a metal.toml scaffold
    InitConfig {
        /// Directory that holds the store
        #[arg(long, default_value = "/var/lib/metal")]
        data_dir: PathBuf,
        #[arg(short, long, default_value = "metal.toml")]
        output: PathBuf,
    },
    /// Load networks, IPs, machines and liveliness from a JSON inventory
    Import {
        file: PathBuf,
    },
    /// List machines as JSON
    Machines,
    /// Select a machine spread across racks and claim it.
    ///
    /// Lost claim races are retried up to [allocation].claim_attempts times.
    Allocate {
        #[arg(long)]
        project: String,
        #[arg(long)]
        partition: String,
        #[arg(long)]
        size: String,
        /// Placement tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Validate an allocation request and print its network plan
    Classify {
        /// Allocation request as JSON
        file: PathBuf,
        #[arg(long)]
        partition: String,
    },
    /// Return a machine to the pool
    Release {
        machine_id: String,
    },
    /// Record the liveliness of a machine
    Liveliness {
        machine_id: String,
        /// alive, dead or unknown
        #[arg(value_parser = parse_liveliness)]
        liveliness: Liveliness,
    },
}

fn parse_liveliness(s: &str) -> Result<Liveliness, String> {
    s.parse()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MetalConfig::from_file(path)?,
        None => MetalConfig::default(),
    };
    if let Some(db) = cli.db {
        config.store.path = db;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log.filter))?,
        )
        .init();

    match cli.command {
        Commands::InitConfig { data_dir, output } => {
            commands::config::init(&data_dir, &output)
        }
        Commands::Import { file } => commands::inventory::import(&config, &file),
        Commands::Machines => commands::inventory::list_machines(&config),
        Commands::Allocate {
            project,
            partition,
            size,
            tags,
        } => commands::allocate::allocate(&config, &project, &partition, &size, &tags),
        Commands::Classify { file, partition } => {
            commands::allocate::classify(&config, &file, &partition)
        }
        Commands::Release { machine_id } => commands::allocate::release(&config, &machine_id),
        Commands::Liveliness {
            machine_id,
            liveliness,
        } => commands::inventory::set_liveliness(&config, &machine_id, liveliness),
    }
}
