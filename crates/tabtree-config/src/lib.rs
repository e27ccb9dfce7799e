//! Configuration system for the tabtree engine.
//!
//! Provides:
//! - TOML engine configuration (`[engine]`, `[persistence]`, `[drag]`)
//! - Config file layering (XDG user config + project-local overrides)
//! - The `user_settings` record controlling new-tab placement

pub mod discovery;
pub mod error;
pub mod settings;
pub mod types;

pub use discovery::{
    default_state_dir, load_config, load_config_file, load_config_with_options, save_config,
    xdg_config_dir, xdg_config_path, ConfigLayer, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use settings::{LinkPlacement, ManualPlacement, UserSettings};
pub use types::*;
