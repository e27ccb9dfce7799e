//! Settings command - the `user_settings` record in the state directory.
//!
//! The engine reads these once at startup, so changes apply to the next
//! `replay`.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use console::style;
use tabtree_config::{LinkPlacement, ManualPlacement, UserSettings};
use tabtree_types::{KeyValueStore, USER_SETTINGS_KEY};

use super::Context;

/// Arguments for the settings command.
#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Show the stored settings (defaults when none are stored)
    Show,

    /// Change one or more settings
    Set {
        /// Placement of tabs opened without an opener: end, child
        #[arg(long, value_parser = parse_placement::<ManualPlacement>)]
        manual: Option<ManualPlacement>,

        /// Placement of tabs opened from a link: end, child, sibling
        #[arg(long, value_parser = parse_placement::<LinkPlacement>)]
        link: Option<LinkPlacement>,

        /// Expand collapsed nodes when a dragged tab hovers over them
        #[arg(long)]
        auto_expand: Option<bool>,
    },
}

/// Parse a placement by its stored (lowercase) name.
fn parse_placement<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| format!("unknown placement '{s}'"))
}

/// Run the settings command.
pub async fn run(args: SettingsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.store();
    let mut settings = UserSettings::from_stored(store.get(USER_SETTINGS_KEY).await?);

    if let SettingsCommand::Set {
        manual,
        link,
        auto_expand,
    } = args.command
    {
        if let Some(manual) = manual {
            settings.new_tab_position_manual = manual;
        }
        if let Some(link) = link {
            settings.new_tab_position_from_link = link;
        }
        if let Some(auto_expand) = auto_expand {
            settings.auto_expand_on_drag_hover = auto_expand;
        }
        store
            .set(USER_SETTINGS_KEY, settings.to_value()?)
            .await
            .with_context(|| format!("failed to write settings to {}", ctx.state_dir.display()))?;
    }

    let value = settings.to_value()?;
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    println!("{}", style("User settings").bold());
    println!("  newTabPositionManual    {}", value["newTabPositionManual"].as_str().unwrap_or("?"));
    println!("  newTabPositionFromLink  {}", value["newTabPositionFromLink"].as_str().unwrap_or("?"));
    println!("  autoExpandOnDragHover   {}", settings.auto_expand_on_drag_hover);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_placement() {
        assert_eq!(parse_placement::<LinkPlacement>("Sibling"), Ok(LinkPlacement::Sibling));
        assert_eq!(parse_placement::<ManualPlacement>("child"), Ok(ManualPlacement::Child));
        assert!(parse_placement::<ManualPlacement>("sibling").is_err());
    }
}
