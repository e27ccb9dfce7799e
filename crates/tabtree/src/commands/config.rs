//! Config command - configuration management.

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};

use tabtree_config::TabtreeConfig;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./tabtree.toml) instead of user config
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the user configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local, force } => cmd_init(local, force),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    if ctx.json_output {
        let resolved = TabtreeConfig {
            engine: Some(config.engine()),
            persistence: Some(config.persistence()),
            drag: Some(config.drag()),
        };
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    let engine = config.engine();
    let persistence = config.persistence();
    let drag = config.drag();

    println!("# tabtree configuration\n");
    println!("Engine:");
    println!("  queue_capacity         {}", engine.queue_capacity);
    println!(
        "  side_panel_url_patterns {}",
        engine.side_panel_url_patterns.join(", ")
    );
    println!("Persistence:");
    println!("  debounce_ms            {}", persistence.debounce_ms);
    println!("  state_dir              {}", ctx.state_dir.display());
    println!("Drag:");
    println!("  auto_expand_delay_ms   {}", drag.auto_expand_delay_ms);
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&ctx.config_files)?);
        return Ok(());
    }
    if ctx.config_files.is_empty() {
        println!("No config files loaded (using defaults)");
    }
    for path in &ctx.config_files {
        println!("{}", path.display());
    }
    Ok(())
}

fn cmd_init(local: bool, force: bool) -> Result<()> {
    let path = if local {
        std::path::PathBuf::from("tabtree.toml")
    } else {
        tabtree_config::xdg_config_path().context("no config directory on this platform")?
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let defaults = TabtreeConfig {
        engine: Some(Default::default()),
        persistence: Some(Default::default()),
        drag: Some(Default::default()),
    };
    tabtree_config::save_config(&defaults, &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_path() -> Result<()> {
    match tabtree_config::xdg_config_path() {
        Some(path) => println!("{}", path.display()),
        None => bail!("no config directory on this platform"),
    }
    Ok(())
}
