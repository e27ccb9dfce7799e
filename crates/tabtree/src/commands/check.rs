//! Check command - validate the persisted tab tree.
//!
//! Loads the snapshot the same way the engine does at startup, so anything
//! reported as a warning here is what a restart would silently repair.

use anyhow::{Result, bail};
use clap::Args;
use console::style;
use serde::Serialize;
use tabtree_core::TreeStore;

use super::{Context, load_snapshot};

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Treat load warnings as failures
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    version: u32,
    nodes: usize,
    loaded: usize,
    warnings: Vec<String>,
    violations: Vec<String>,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let Some(snapshot) = load_snapshot(&ctx.store()).await? else {
        bail!("no saved tree in {}", ctx.state_dir.display());
    };

    let (store, warnings) = TreeStore::from_snapshot(&snapshot);
    let report = CheckReport {
        version: snapshot.version,
        nodes: snapshot.node_count(),
        loaded: store.len(),
        violations: store.check_invariants(),
        warnings,
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.violations.is_empty() {
        bail!("{} invariant violation(s)", report.violations.len());
    }
    if args.strict && !report.warnings.is_empty() {
        bail!("{} load warning(s)", report.warnings.len());
    }
    Ok(())
}

fn print_report(report: &CheckReport) {
    println!(
        "Snapshot v{}: {} nodes recorded, {} loaded",
        report.version, report.nodes, report.loaded
    );
    for warning in &report.warnings {
        println!("  {} {warning}", style("warning:").yellow());
    }
    for violation in &report.violations {
        println!("  {} {violation}", style("violation:").red());
    }
    if report.warnings.is_empty() && report.violations.is_empty() {
        println!("{}", style("OK").green().bold());
    }
}
