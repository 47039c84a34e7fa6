mod aggregate;
mod commands;
mod config;
mod hash;
mod history;
mod pipeline;
mod playlist;
mod pool;
mod precheck;
mod probe;
mod rank;
mod recovery;
mod registry;

use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crate::config::{Config, RecoveryPolicy, Retention};

#[derive(Parser)]
#[command(
    name = "subnet-revive",
    about = "Probe IPTV endpoints and recover dead ones from their /24",
    version,
    propagate_version = true,
)]
struct Cli {
    /// TOML config file; built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe candidate groups, sweep the /24 of dead ones, write the ranked result
    Revive {
        /// Candidate group files, read as one batch
        #[arg(short, long = "input", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, value_enum)]
        policy: Option<RecoveryPolicy>,
        /// Also write the JSON run summary here
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Build a candidate group file from a directory of old playlists
    Aggregate {
        #[arg(short, long)]
        dir: Option<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Convert a group file into an extended M3U playlist
    M3u {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Delete history snapshots with identical content
    DedupeHistory {
        #[arg(short, long)]
        dir: Option<PathBuf>,
        #[arg(short, long, value_enum)]
        retention: Option<Retention>,
        /// Report what would be deleted without deleting it
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("subnet_revive=info"))
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())
        .context("Failed to load config")?;
    if let Some(path) = &cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }

    match cli.command {
        Commands::Revive { inputs, output, policy, summary } => {
            if let Some(output) = output {
                config.output.path = output;
            }
            if let Some(policy) = policy {
                config.recovery.policy = policy;
            }
            if summary.is_some() {
                config.output.summary_path = summary;
            }
            commands::revive::run(&inputs, &config).await
        }
        Commands::Aggregate { dir, output } => {
            let dir = dir.unwrap_or_else(|| config.history.dir.clone());
            commands::tools::aggregate(&dir, &output, &config)
        }
        Commands::M3u { input, output } => commands::tools::m3u(&input, &output, &config),
        Commands::DedupeHistory { dir, retention, dry_run } => {
            let dir = dir.unwrap_or_else(|| config.history.dir.clone());
            let retention = retention.unwrap_or(config.history.retention);
            commands::tools::dedupe(&dir, retention, dry_run)
        }
    }
}
