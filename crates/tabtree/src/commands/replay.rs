//! Replay command - drive the engine with a scripted browser session.
//!
//! A script is JSON Lines, one step per line. Blank lines and lines starting
//! with `#` are skipped.
//!
//! ```text
//! {"step": "window"}
//! {"step": "open", "window": 1, "url": "https://example.com/"}
//! {"step": "open", "window": 1, "opener": 1, "active": false}
//! {"step": "ui", "command": {"command": "set_expanded", "tab": 1, "expanded": false}}
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use console::style;
use serde::{Deserialize, Serialize};
use tabtree_core::TreeStore;
use tabtree_engine::{Engine, EngineHandle, EngineOptions, SimulatedBrowser, UiCommand, UiReply};
use tabtree_types::{TabApi, TabId, UpdateTab, WindowApi, WindowId};

use super::Context;
use crate::render::TreeView;

/// Rounds of event delivery per step before the session counts as stuck.
const MAX_PUMP_ROUNDS: usize = 100;

const DEFAULT_URL: &str = "about:blank";

/// Arguments for the replay command.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Script of browser actions and UI commands (JSON Lines)
    pub script: PathBuf,

    /// Print each step as it is applied
    #[arg(long)]
    pub trace: bool,
}

/// One scripted action.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Open a focused window.
    Window,
    /// Open a tab as a user would.
    Open {
        window: WindowId,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        opener: Option<TabId>,
        #[serde(default = "default_true")]
        active: bool,
    },
    Close {
        tab: TabId,
    },
    /// Drag a tab in the browser's own tab strip.
    Move {
        tab: TabId,
        index: usize,
    },
    Pin {
        tab: TabId,
    },
    Unpin {
        tab: TabId,
    },
    Activate {
        tab: TabId,
    },
    Navigate {
        tab: TabId,
        url: String,
    },
    /// Move a tab into another window, at the end unless `index` is given.
    Attach {
        tab: TabId,
        window: WindowId,
        #[serde(default)]
        index: Option<usize>,
    },
    CloseWindow {
        window: WindowId,
    },
    /// Issue a command from the tree UI.
    Ui {
        command: UiCommand,
    },
    /// Let real time pass (hover auto-expand, save debounce).
    Wait {
        ms: u64,
    },
}

fn default_true() -> bool {
    true
}

/// Parse a script, reporting the first bad line.
pub fn parse_script(text: &str) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step = serde_json::from_str(line).with_context(|| format!("line {}: invalid step", n + 1))?;
        steps.push(step);
    }
    Ok(steps)
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    steps: usize,
    rejected: Vec<Rejected>,
    tree: TreeView,
}

#[derive(Debug, Serialize)]
struct Rejected {
    step: usize,
    error: String,
}

/// Run the replay command.
pub async fn run(args: ReplayArgs, ctx: &Context) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.script)
        .await
        .with_context(|| format!("failed to read {}", args.script.display()))?;
    let steps = parse_script(&text)?;

    let browser = Arc::new(SimulatedBrowser::new());
    let storage = Arc::new(ctx.store());
    let options = EngineOptions::from_config(&ctx.config)?;
    let (handle, task) = Engine::start(browser.clone(), storage, options).await?;

    let mut rejected = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        let n = i + 1;
        if args.trace && !ctx.json_output {
            println!("{} {}", style(format!("{n:>3}")).dim(), serde_json::to_string(step)?);
        }
        match apply(&browser, &handle, step).await {
            Ok(Some(reply)) if args.trace && !ctx.json_output => {
                println!("    {} {reply:?}", style("->").dim());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(step = n, error = %e, "Step rejected");
                rejected.push(Rejected {
                    step: n,
                    error: format!("{e:#}"),
                });
            }
        }
        pump(&browser, &handle).await?;
    }

    handle.flush().await?;
    let snapshot = handle.snapshot().await?;
    let unread: HashSet<TabId> = handle.unread().await?.into_iter().collect();
    handle.shutdown().await?;
    task.await?;

    let (store, _) = TreeStore::from_snapshot(&snapshot);
    let tree = TreeView::build(&store, snapshot.saved_at.to_rfc3339(), &unread);

    if ctx.json_output {
        let output = ReplayOutput {
            steps: steps.len(),
            rejected,
            tree,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for line in tree.lines() {
        println!("{line}");
    }
    println!();
    for r in &rejected {
        println!("{} step {}: {}", style("rejected").red(), r.step, r.error);
    }
    println!(
        "{} {} steps, {} tabs, state saved to {}",
        style("Replayed").green().bold(),
        steps.len(),
        tree.tabs,
        ctx.state_dir.display()
    );
    Ok(())
}

/// Apply one step. Browser actions are fed back through [`pump`]; UI
/// commands return the engine's reply.
async fn apply(browser: &SimulatedBrowser, handle: &EngineHandle, step: &Step) -> Result<Option<UiReply>> {
    match step {
        Step::Window => {
            browser.open_window();
        }
        Step::Open {
            window,
            url,
            opener,
            active,
        } => {
            browser.open_tab(*window, url.as_deref().unwrap_or(DEFAULT_URL), *opener, *active)?;
        }
        Step::Close { tab } => browser.remove_tab(*tab).await?,
        Step::Move { tab, index } => {
            let Some(current) = browser.tab(*tab) else {
                bail!("tab {tab} does not exist");
            };
            browser.move_tab(*tab, current.window_id, *index).await?;
        }
        Step::Pin { tab } | Step::Unpin { tab } => {
            let pinned = matches!(step, Step::Pin { .. });
            browser
                .update_tab(
                    *tab,
                    UpdateTab {
                        pinned: Some(pinned),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Step::Activate { tab } => browser.activate_tab(*tab).await?,
        Step::Navigate { tab, url } => browser.navigate(*tab, url)?,
        Step::Attach { tab, window, index } => {
            browser.move_tab(*tab, *window, index.unwrap_or(usize::MAX)).await?;
        }
        Step::CloseWindow { window } => browser.remove_window(*window).await?,
        Step::Ui { command } => return Ok(Some(handle.ui(command.clone()).await?)),
        Step::Wait { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
    }
    Ok(None)
}

/// Deliver browser events until neither side has anything left to say.
async fn pump(browser: &SimulatedBrowser, handle: &EngineHandle) -> Result<()> {
    for _ in 0..MAX_PUMP_ROUNDS {
        let events = browser.take_events();
        if events.is_empty() {
            return Ok(());
        }
        for event in events {
            handle.send_native(event).await?;
        }
        handle.ping().await?;
    }
    bail!("browser and engine did not settle after {MAX_PUMP_ROUNDS} rounds")
}
