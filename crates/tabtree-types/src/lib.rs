//! Shared types for the tabtree tab-tree engine.
//!
//! - Identifier newtypes for native tabs and windows, tree nodes, and views
//! - Native tab/window records and lifecycle events
//! - Capability traits for the native tab/window API and key-value storage
//! - The coarse notification broadcast to UI observers

pub mod api;
pub mod error;
pub mod ids;
pub mod native;

pub use api::{CreateTab, KeyValueStore, NativeApi, TabApi, UpdateTab, WindowApi};
pub use error::{NativeError, NativeResult, StorageError, StorageResult};
pub use ids::{NodeId, TabId, ViewId, WindowId};
pub use native::{NativeEvent, NativeTab, NativeWindow, TabChange};

/// Storage key of the persisted tree snapshot.
pub const TREE_STATE_KEY: &str = "tree_state";

/// Storage key of the persisted unread tab ids.
pub const UNREAD_TABS_KEY: &str = "unread_tabs";

/// Storage key of the user settings written by the settings page.
pub const USER_SETTINGS_KEY: &str = "user_settings";

/// Message broadcast to UI surfaces after the tree changes.
///
/// Carries no diff: observers re-read the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    StateUpdated { revision: u64 },
}
