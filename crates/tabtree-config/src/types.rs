//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [engine]        # queue sizing, side-panel exclusion
//! [persistence]   # save debounce, state directory
//! [drag]          # drag-and-drop auto-expand delay
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default capacity of the engine's command queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default debounce before a dirty tree is written to storage.
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 500;

/// Default hover time before a collapsed node auto-expands during a drag.
pub const DEFAULT_AUTO_EXPAND_DELAY_MS: u64 = 1000;

/// URL pattern of the engine's own side panel page.
pub const DEFAULT_SIDE_PANEL_PATTERN: &str = "chrome-extension://*/sidepanel.html*";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabtreeConfig {
    pub engine: Option<EngineSection>,
    pub persistence: Option<PersistenceSection>,
    pub drag: Option<DragSection>,
}

impl TabtreeConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: TabtreeConfig) {
        if other.engine.is_some() {
            self.engine = other.engine;
        }
        if other.persistence.is_some() {
            self.persistence = other.persistence;
        }
        if other.drag.is_some() {
            self.drag = other.drag;
        }
    }

    /// Effective engine section.
    pub fn engine(&self) -> EngineSection {
        self.engine.clone().unwrap_or_default()
    }

    /// Effective persistence section.
    pub fn persistence(&self) -> PersistenceSection {
        self.persistence.clone().unwrap_or_default()
    }

    /// Effective drag section.
    pub fn drag(&self) -> DragSection {
        self.drag.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Engine settings.
///
/// ```toml
/// [engine]
/// queue_capacity = 256
/// side_panel_url_patterns = ["chrome-extension://*/sidepanel.html*"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Bounded capacity of the command queue feeding the worker.
    pub queue_capacity: usize,
    /// Glob patterns identifying the engine's own UI pseudo-tab.
    pub side_panel_url_patterns: Vec<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            side_panel_url_patterns: vec![DEFAULT_SIDE_PANEL_PATTERN.to_string()],
        }
    }
}

impl EngineSection {
    /// Compile the side-panel patterns.
    pub fn side_panel_matcher(&self) -> Result<UrlMatcher> {
        UrlMatcher::new(&self.side_panel_url_patterns)
    }
}

/// Persistence settings.
///
/// ```toml
/// [persistence]
/// debounce_ms = 500
/// state_dir = "/var/lib/tabtree"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSection {
    pub debounce_ms: u64,
    /// Directory of the file-backed key-value store. Defaults to the platform data dir.
    pub state_dir: Option<PathBuf>,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            state_dir: None,
        }
    }
}

impl PersistenceSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Resolve the state directory, falling back to the platform data dir.
    pub fn resolve_state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .or_else(crate::discovery::default_state_dir)
            .unwrap_or_else(|| PathBuf::from(".tabtree"))
    }
}

/// Drag-and-drop settings.
///
/// ```toml
/// [drag]
/// auto_expand_delay_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragSection {
    pub auto_expand_delay_ms: u64,
}

impl Default for DragSection {
    fn default() -> Self {
        Self {
            auto_expand_delay_ms: DEFAULT_AUTO_EXPAND_DELAY_MS,
        }
    }
}

impl DragSection {
    pub fn auto_expand_delay(&self) -> Duration {
        Duration::from_millis(self.auto_expand_delay_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// URL matching
// ─────────────────────────────────────────────────────────────────────────────

/// Compiled set of URL glob patterns.
#[derive(Debug, Clone, Default)]
pub struct UrlMatcher {
    patterns: Vec<glob::Pattern>,
}

impl UrlMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| ConfigError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether `url` matches any pattern.
    pub fn matches(&self, url: &str) -> bool {
        !url.is_empty() && self.patterns.iter().any(|p| p.matches(url))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config() {
        let config = TabtreeConfig::new();
        assert!(config.engine.is_none());
        assert_eq!(config.engine().queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(
            config.persistence().debounce(),
            Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS)
        );
        assert_eq!(
            config.drag().auto_expand_delay(),
            Duration::from_millis(DEFAULT_AUTO_EXPAND_DELAY_MS)
        );
    }

    #[test]
    fn test_parse_partial_sections() {
        let toml = r#"
[persistence]
debounce_ms = 50

[drag]
auto_expand_delay_ms = 300
"#;
        let config = TabtreeConfig::from_toml(toml).unwrap();
        assert!(config.engine.is_none());
        assert_eq!(config.persistence().debounce_ms, 50);
        assert!(config.persistence().state_dir.is_none());
        assert_eq!(config.drag().auto_expand_delay_ms, 300);
    }

    #[test]
    fn test_merge_overrides_sections() {
        let mut base = TabtreeConfig::from_toml("[drag]\nauto_expand_delay_ms = 100\n").unwrap();
        let overlay = TabtreeConfig::from_toml("[persistence]\ndebounce_ms = 10\n").unwrap();
        base.merge(overlay);
        assert_eq!(base.drag().auto_expand_delay_ms, 100);
        assert_eq!(base.persistence().debounce_ms, 10);
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = TabtreeConfig {
            drag: Some(DragSection {
                auto_expand_delay_ms: 250,
            }),
            ..Default::default()
        };
        let text = config.to_toml().unwrap();
        assert!(text.contains("auto_expand_delay_ms = 250"));
        assert_eq!(TabtreeConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_side_panel_matcher() {
        let matcher = EngineSection::default().side_panel_matcher().unwrap();
        assert!(matcher.matches("chrome-extension://abcdef/sidepanel.html"));
        assert!(matcher.matches("chrome-extension://abcdef/sidepanel.html?window=3"));
        assert!(!matcher.matches("https://example.com/sidepanel.html"));
        assert!(!matcher.matches(""));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = UrlMatcher::new(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }
}
