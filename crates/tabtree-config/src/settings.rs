//! User settings stored under the `user_settings` key.
//!
//! Written by the settings page, read by the engine at startup. Field names are
//! camelCase on the wire. Unknown fields are ignored so newer settings pages
//! can add keys without breaking older engines.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where a tab opened without an opener (new-tab button, shortcut) goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualPlacement {
    /// Append at the end of the active view's roots.
    #[default]
    End,
    /// Child of the window's active tab.
    Child,
}

/// Where a tab opened from a link in another tab goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPlacement {
    End,
    /// Last child of the opener.
    #[default]
    Child,
    /// Right after the opener, under the opener's parent.
    Sibling,
}

/// The `user_settings` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub new_tab_position_manual: ManualPlacement,
    pub new_tab_position_from_link: LinkPlacement,
    pub auto_expand_on_drag_hover: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            new_tab_position_manual: ManualPlacement::default(),
            new_tab_position_from_link: LinkPlacement::default(),
            auto_expand_on_drag_hover: true,
        }
    }
}

impl UserSettings {
    /// Decode a stored settings value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Decode a stored settings value, falling back to defaults when it is
    /// missing or malformed.
    pub fn from_stored(value: Option<serde_json::Value>) -> Self {
        match value {
            None => Self::default(),
            Some(value) => Self::from_value(value).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring invalid user settings");
                Self::default()
            }),
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
