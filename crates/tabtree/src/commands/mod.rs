//! CLI command handlers.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tabtree_config::TabtreeConfig;
use tabtree_core::TreeSnapshot;
use tabtree_engine::FileStore;
use tabtree_types::{KeyValueStore, TREE_STATE_KEY, TabId, UNREAD_TABS_KEY};

pub mod check;
pub mod config;
pub mod replay;
pub mod settings;
pub mod show;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Resolved engine configuration.
    pub config: TabtreeConfig,
    /// Config files that contributed to `config`, lowest precedence first.
    pub config_files: Vec<PathBuf>,
    /// Directory of the file-backed key-value store.
    pub state_dir: PathBuf,
}

impl Context {
    pub fn store(&self) -> FileStore {
        FileStore::new(&self.state_dir)
    }
}

/// Read the persisted snapshot, if one has been saved.
pub async fn load_snapshot(store: &FileStore) -> Result<Option<TreeSnapshot>> {
    let Some(value) = store.get(TREE_STATE_KEY).await? else {
        return Ok(None);
    };
    let snapshot = serde_json::from_value(value)
        .with_context(|| format!("{TREE_STATE_KEY} in {} is not a tree snapshot", store.dir().display()))?;
    Ok(Some(snapshot))
}

/// Read the persisted unread tab ids. Missing or malformed data reads as none.
pub async fn load_unread(store: &FileStore) -> Result<HashSet<TabId>> {
    let ids = match store.get(UNREAD_TABS_KEY).await? {
        Some(value) => serde_json::from_value::<Vec<TabId>>(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring malformed unread list");
            Vec::new()
        }),
        None => Vec::new(),
    };
    Ok(ids.into_iter().collect())
}
