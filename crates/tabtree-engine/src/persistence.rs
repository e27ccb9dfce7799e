//! Persistence manager: debounced saves of the tree to the key-value store.
//!
//! State machine: `Idle -> PendingSave -> Saving -> Idle`. Every change while
//! idle or pending (re)starts the debounce window; the worker calls
//! [`PersistenceManager::save`] once [`PersistenceManager::deadline`] passes.
//! A failed save is retried once and then logged. The in-memory tree stays
//! authoritative either way.

use std::sync::Arc;
use std::time::Duration;

use tabtree_config::UserSettings;
use tabtree_core::{TreeSnapshot, TreeStore};
use tabtree_types::{
    KeyValueStore, StorageError, TREE_STATE_KEY, TabId, UNREAD_TABS_KEY, USER_SETTINGS_KEY,
};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;

/// Save scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    PendingSave { deadline: Instant },
    Saving,
}

/// Everything read from storage at startup.
#[derive(Debug, Clone, Default)]
pub struct LoadedState {
    pub snapshot: Option<TreeSnapshot>,
    pub unread: Vec<TabId>,
    pub settings: UserSettings,
}

pub struct PersistenceManager {
    store: Arc<dyn KeyValueStore>,
    debounce: Duration,
    state: SaveState,
    saves: u64,
}

impl PersistenceManager {
    pub fn new(store: Arc<dyn KeyValueStore>, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            state: SaveState::Idle,
            saves: 0,
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    /// Successful saves so far.
    pub fn saves(&self) -> u64 {
        self.saves
    }

    /// When the pending save is due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            SaveState::PendingSave { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Start or restart the debounce window.
    pub fn schedule(&mut self, now: Instant) {
        let deadline = now + self.debounce;
        if let SaveState::PendingSave { deadline: previous } = self.state {
            debug!(delay_ms = (deadline - previous).as_millis() as u64, "Save postponed");
        }
        self.state = SaveState::PendingSave { deadline };
    }

    /// Write the tree and the unread set, retrying once on failure.
    pub async fn save(&mut self, tree: &TreeStore) -> Result<()> {
        self.state = SaveState::Saving;
        let result = match self.write(tree).await {
            Ok(()) => Ok(()),
            Err(first) => {
                debug!(error = %first, "Save failed, retrying");
                self.write(tree).await
            }
        };
        self.state = SaveState::Idle;

        match result {
            Ok(()) => {
                self.saves += 1;
                debug!(revision = tree.revision(), nodes = tree.len(), "Tree saved");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to save tree state");
                Err(e)
            }
        }
    }

    /// Save now if a save is pending. Returns whether a save was attempted.
    pub async fn flush(&mut self, tree: &TreeStore) -> Result<bool> {
        if self.deadline().is_none() {
            return Ok(false);
        }
        self.save(tree).await.map(|()| true)
    }

    async fn write(&self, tree: &TreeStore) -> Result<()> {
        let snapshot = serde_json::to_value(tree.snapshot()).map_err(StorageError::from)?;
        let unread = serde_json::to_value(tree.unread_tab_ids()).map_err(StorageError::from)?;
        self.store.set(TREE_STATE_KEY, snapshot).await?;
        self.store.set(UNREAD_TABS_KEY, unread).await?;
        Ok(())
    }

    /// Read the last snapshot, unread ids, and user settings.
    ///
    /// Never fails: unreadable entries are logged and treated as absent.
    pub async fn load(&self) -> LoadedState {
        let snapshot = self.read(TREE_STATE_KEY).await.and_then(|value| {
            serde_json::from_value::<TreeSnapshot>(value)
                .map_err(|e| warn!(error = %e, "Discarding unreadable tree snapshot"))
                .ok()
        });
        let unread = self
            .read(UNREAD_TABS_KEY)
            .await
            .and_then(|value| {
                serde_json::from_value::<Vec<TabId>>(value)
                    .map_err(|e| warn!(error = %e, "Discarding unreadable unread set"))
                    .ok()
            })
            .unwrap_or_default();
        let settings = UserSettings::from_stored(self.read(USER_SETTINGS_KEY).await);

        LoadedState {
            snapshot,
            unread,
            settings,
        }
    }

    async fn read(&self, key: &str) -> Option<serde_json::Value> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read stored value");
                None
            }
        }
    }
}

impl std::fmt::Debug for PersistenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("debounce", &self.debounce)
            .field("state", &self.state)
            .field("saves", &self.saves)
            .finish_non_exhaustive()
    }
}
