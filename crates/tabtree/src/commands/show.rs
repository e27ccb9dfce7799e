//! Show command - print the persisted tab tree.

use anyhow::Result;
use clap::Args;
use console::style;

use super::{Context, load_snapshot, load_unread};
use crate::render::TreeView;

/// Arguments for the show command.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Only show this window
    #[arg(long)]
    pub window: Option<i64>,
}

/// Run the show command.
pub async fn run(args: ShowArgs, ctx: &Context) -> Result<()> {
    let store = ctx.store();
    let Some(snapshot) = load_snapshot(&store).await? else {
        if ctx.json_output {
            println!("null");
        } else {
            println!("No saved tree in {}", ctx.state_dir.display());
        }
        return Ok(());
    };
    let unread = load_unread(&store).await?;

    let (mut tree, warnings) = TreeView::from_snapshot(&snapshot, &unread);
    if let Some(window) = args.window {
        tree.windows.retain(|w| w.window_id.0 == window);
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&tree)?);
        return Ok(());
    }

    println!(
        "{} {} tabs, saved {}",
        style("Tree").bold(),
        tree.tabs,
        tree.saved_at
    );
    if ctx.verbose {
        println!("  from {}", store.dir().display());
    }
    println!();
    for line in tree.lines() {
        println!("{line}");
    }
    if !warnings.is_empty() {
        println!();
        println!(
            "{} {} snapshot entries were dropped; run `tabtree check` for details",
            style("warning:").yellow(),
            warnings.len()
        );
    }
    Ok(())
}
