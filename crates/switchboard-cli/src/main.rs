//! Switchboard CLI - service broker tooling.
//!
//! Validates service manifests, inspects the package catalog, evaluates
//! connection policy offline and runs a broker over the configured package
//! directory.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;
mod theme;

use commands::{catalog, config, manifest, run};

/// Switchboard - capability-checked service broker
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an explicit configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a service manifest file
    Validate {
        /// Path to the manifest JSON
        manifest: PathBuf,
        /// Print the normalized manifest as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect the package catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },

    /// View and validate configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run the broker over the configured package directory
    Run {
        /// Service to start once the broker is up (repeatable)
        #[arg(short, long = "start")]
        start: Vec<String>,
        /// User GUID to start services for (defaults to a fresh one)
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// List packages found in the package directory
    List,
    /// Show the resolved entry for a service name
    Show {
        /// Service name
        name: String,
    },
    /// Show what one service is granted on another
    Grants {
        /// Requesting service
        source: String,
        /// Target service
        target: String,
        /// Interface to check against the grant
        #[arg(short, long)]
        interface: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show resolved configuration with source annotations
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,
        /// Show only a specific section (catalog, broker, logging)
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Validate the current configuration
    Validate,
    /// Show config file paths being checked
    Paths,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging from config, with --verbose override.
    let resolved = switchboard_config::Config::load(cli.config.as_deref()).ok();
    let log_config = match resolved
        .as_ref()
        .map(|r| switchboard_telemetry::LogConfig::from_config(&r.config.logging))
    {
        Some(Ok(mut lc)) => {
            if cli.verbose {
                "debug".clone_into(&mut lc.level);
            }
            lc
        },
        Some(Err(e)) => {
            eprintln!("Invalid logging configuration: {e}");
            config_bridge::fallback_log_config(cli.verbose)
        },
        None => config_bridge::fallback_log_config(cli.verbose),
    };
    if let Err(e) = switchboard_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Validate { manifest, json } => manifest::validate_manifest(&manifest, json),
        Commands::Catalog { command } => handle_catalog(command, cli.config.as_deref()),
        Commands::Config { command } => handle_config(command, cli.config.as_deref()),
        Commands::Run { start, user } => {
            let resolved = switchboard_config::Config::load(cli.config.as_deref())?;
            run::run_broker(&resolved.config, &start, user).await
        },
    }
}

fn handle_catalog(command: CatalogCommands, config_file: Option<&std::path::Path>) -> Result<()> {
    let resolved = switchboard_config::Config::load(config_file)?;
    let layout = config_bridge::to_package_layout(&resolved.config.catalog);
    match command {
        CatalogCommands::List => catalog::list_packages(&layout),
        CatalogCommands::Show { name } => catalog::show_entry(&layout, &name),
        CatalogCommands::Grants {
            source,
            target,
            interface,
        } => catalog::show_grants(&layout, &source, &target, interface.as_deref()),
    }
}

fn handle_config(command: ConfigCommands, config_file: Option<&std::path::Path>) -> Result<()> {
    match command {
        ConfigCommands::Show { format, section } => {
            config::show_config(config_file, &format, section.as_deref())
        },
        ConfigCommands::Validate => config::validate_config(config_file),
        ConfigCommands::Paths => config::show_paths(config_file),
    }
}
