//! bpfmap CLI
//!
//! Inspect kernel map kinds, check feature probe output, and dry-run the
//! reconciliation engine against in-memory maps.

mod commands;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "bpfmap")]
#[command(version)]
#[command(about = "Kernel map capability and reconciliation tool", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List map kinds and their preallocation facts
    Kinds,

    /// Show which advanced map kinds the kernel supports
    Probe {
        /// Feature probe output (lines of `#define HAVE_<NAME>_MAP_TYPE`)
        #[arg(short, long)]
        features: PathBuf,
    },

    /// Reconcile configured maps against in-memory kernel maps
    Sync {
        /// Agent configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Give up waiting for a map to settle after this many seconds
        #[arg(short, long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if cli.verbose {
        println!(
            "{}",
            concat!("bpfmap v", env!("CARGO_PKG_VERSION")).cyan().bold()
        );
    }

    match cli.command {
        Commands::Kinds => commands::kinds::list_kinds(),
        Commands::Probe { features } => commands::probe::show_features(&features),
        Commands::Sync {
            config,
            timeout_secs,
        } => commands::sync::run_sync(&config, Duration::from_secs(timeout_secs)).await,
    }
}
