//! tabtree - replay and inspect tab tree sessions
//!
//! Main entry point for the tabtree CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

mod commands;
mod render;

use commands::{check, config, replay, settings, show};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// tabtree - replay and inspect tab tree sessions
#[derive(Parser)]
#[command(name = "tabtree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to load instead of the discovered layers
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the persisted tree state
    #[arg(long, global = true, env = "TABTREE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a scripted browser session through the engine
    Replay(replay::ReplayArgs),

    /// Show the persisted tab tree
    Show(show::ShowArgs),

    /// Check the persisted tab tree for structural problems
    Check(check::CheckArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Show or change new-tab placement settings
    Settings(settings::SettingsArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "tabtree=debug,tabtree_engine=debug,tabtree_core=debug,tabtree_config=debug,info"
    } else {
        "tabtree=info,tabtree_engine=warn,tabtree_core=warn,tabtree_config=warn,warn"
    };

    let log_dir = tabtree_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tabtree.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "tabtree=trace,tabtree_engine=trace,tabtree_core=trace,tabtree_config=trace,info",
                )),
        )
        .init();

    let (config, config_files) = match &cli.config {
        Some(path) => {
            let config = tabtree_config::load_config_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            (config, vec![path.clone()])
        }
        None => {
            let loaded = tabtree_config::load_config(None)?;
            for warning in &loaded.warnings {
                tracing::warn!(%warning, "Config warning");
            }
            let files = loaded.loaded_from().into_iter().map(PathBuf::from).collect();
            (loaded.config, files)
        }
    };

    let state_dir = cli
        .state_dir
        .unwrap_or_else(|| config.persistence().resolve_state_dir());

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config,
        config_files,
        state_dir,
    };

    match cli.command {
        Commands::Replay(args) => replay::run(args, &ctx).await,
        Commands::Show(args) => show::run(args, &ctx).await,
        Commands::Check(args) => check::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
        Commands::Settings(args) => settings::run(args, &ctx).await,
    }
}
