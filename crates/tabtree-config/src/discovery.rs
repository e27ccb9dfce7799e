//! Where configuration comes from.
//!
//! Two TOML layers are read, the second overriding the first field by field:
//!
//! 1. `config.toml` in the user config dir (`$TABTREE_CONFIG_DIR`, or the
//!    platform config dir plus `tabtree/`)
//! 2. `tabtree.toml` in the project directory (the working directory by default)
//!
//! A layer that is missing is skipped; one that fails to parse is skipped with
//! a warning so a typo never keeps the engine from starting.

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, TabtreeConfig};

const APP_DIR: &str = "tabtree";
const USER_CONFIG_FILE: &str = "config.toml";
const PROJECT_CONFIG_FILE: &str = "tabtree.toml";
const CONFIG_DIR_ENV: &str = "TABTREE_CONFIG_DIR";

/// One config file that discovery looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    pub path: PathBuf,
    /// False when the file was absent or unreadable.
    pub loaded: bool,
}

/// Merged configuration plus an account of how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TabtreeConfig,
    /// Every layer checked, lowest precedence first.
    pub layers: Vec<ConfigLayer>,
    /// Skipped layers and values replaced by defaults.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of the layers that contributed values.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.layers
            .iter()
            .filter_map(|l| l.loaded.then_some(l.path.as_path()))
            .collect()
    }
}

/// Discover and merge both layers. `project_dir` defaults to the working directory.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], reading the user layer from `config_dir` when given.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let user = config_dir
        .map(|d| d.join(USER_CONFIG_FILE))
        .or_else(xdg_config_path);
    let project = project_dir.unwrap_or(Path::new(".")).join(PROJECT_CONFIG_FILE);

    let mut loaded = LoadedConfig {
        config: TabtreeConfig::new(),
        layers: Vec::with_capacity(2),
        warnings: Vec::new(),
    };
    for path in user.into_iter().chain(std::iter::once(project)) {
        let layer = merge_layer(&mut loaded, path);
        loaded.layers.push(layer);
    }
    check_values(&mut loaded.config, &mut loaded.warnings);
    Ok(loaded)
}

/// Read a single config file, without discovery or value checks.
pub fn load_config_file(path: &Path) -> Result<TabtreeConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    TabtreeConfig::from_toml(&text)
}

/// Write `config` as TOML, creating missing parent directories.
pub fn save_config(config: &TabtreeConfig, path: &Path) -> Result<()> {
    let write_err = |at: &Path, source| ConfigError::WriteFile {
        path: at.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(|e| write_err(path, e))
}

/// The user layer's file path.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// The user config directory; `$TABTREE_CONFIG_DIR` wins when set and non-empty.
pub fn xdg_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join(APP_DIR)),
    }
}

/// Platform data directory for persisted tree state.
pub fn default_state_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR))
}

fn merge_layer(loaded: &mut LoadedConfig, path: PathBuf) -> ConfigLayer {
    if !path.is_file() {
        return ConfigLayer { path, loaded: false };
    }
    match load_config_file(&path) {
        Ok(layer) => {
            loaded.config.merge(layer);
            ConfigLayer { path, loaded: true }
        }
        Err(e) => {
            loaded
                .warnings
                .push(format!("skipped {}: {e}", path.display()));
            ConfigLayer { path, loaded: false }
        }
    }
}

/// Reject values the engine cannot run with, replacing them with defaults.
fn check_values(config: &mut TabtreeConfig, warnings: &mut Vec<String>) {
    let Some(engine) = config.engine.as_mut() else {
        return;
    };
    if engine.queue_capacity == 0 {
        warnings.push(format!(
            "[engine] queue_capacity must be positive; using {}",
            crate::DEFAULT_QUEUE_CAPACITY
        ));
        engine.queue_capacity = crate::DEFAULT_QUEUE_CAPACITY;
    }
    if let Err(e) = engine.side_panel_matcher() {
        warnings.push(format!("[engine] {e}; using default side panel pattern"));
        engine.side_panel_url_patterns = vec![crate::DEFAULT_SIDE_PANEL_PATTERN.to_string()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_xdg_config_path_exists() {
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[persistence]
debounce_ms = 120
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.persistence().debounce_ms, 120);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let dir = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        let loaded =
            load_config_with_options(Some(dir.path()), Some(empty_config_dir.path())).unwrap();
        assert_eq!(loaded.config, TabtreeConfig::default());
        assert!(loaded.loaded_from().is_empty());
        assert_eq!(loaded.layers.len(), 2);
    }

    #[test]
    fn test_load_config_layered_merge() {
        let xdg_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();

        fs::write(
            xdg_dir.path().join("config.toml"),
            r#"
[persistence]
debounce_ms = 900

[drag]
auto_expand_delay_ms = 700
"#,
        )
        .unwrap();
        fs::write(
            project_dir.path().join("tabtree.toml"),
            r#"
[drag]
auto_expand_delay_ms = 200
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(xdg_dir.path())).unwrap();

        assert_eq!(loaded.config.drag().auto_expand_delay_ms, 200);
        assert_eq!(loaded.config.persistence().debounce_ms, 900);
        let from = loaded.loaded_from();
        assert_eq!(from.len(), 2);
        assert!(from[0].starts_with(xdg_dir.path()));
    }

    #[test]
    fn test_broken_layer_is_a_warning() {
        let xdg_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        fs::write(project_dir.path().join("tabtree.toml"), "[drag\n").unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(xdg_dir.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("tabtree.toml"));
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let xdg_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        fs::write(
            project_dir.path().join("tabtree.toml"),
            r#"
[engine]
queue_capacity = 0
side_panel_url_patterns = ["["]
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(xdg_dir.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 2);
        let engine = loaded.config.engine();
        assert_eq!(engine.queue_capacity, crate::DEFAULT_QUEUE_CAPACITY);
        assert!(engine.side_panel_matcher().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = TabtreeConfig::from_toml("[persistence]\ndebounce_ms = 42\n").unwrap();

        save_config(&config, &path).unwrap();
        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }
}
