//! Capability traits for the host browser and its key-value storage.
//!
//! The engine never talks to a concrete browser. Everything it needs is
//! expressed here so the reconciler and persistence manager can run against
//! an in-process fake in tests.

use async_trait::async_trait;

use crate::error::{NativeResult, StorageResult};
use crate::ids::{TabId, WindowId};
use crate::native::{NativeTab, NativeWindow};

/// Parameters for opening a new native tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTab {
    pub window_id: Option<WindowId>,
    pub url: Option<String>,
    pub opener_tab_id: Option<TabId>,
    pub index: Option<usize>,
    pub active: bool,
    pub pinned: bool,
}

/// Parameters for updating a native tab. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateTab {
    pub pinned: Option<bool>,
    pub active: Option<bool>,
    pub url: Option<String>,
}

/// Tab half of the native API.
#[async_trait]
pub trait TabApi: Send + Sync {
    /// List tabs, optionally restricted to one window. Order is unspecified;
    /// callers sort by [`NativeTab::index`].
    async fn query_tabs(&self, window_id: Option<WindowId>) -> NativeResult<Vec<NativeTab>>;

    async fn create_tab(&self, request: CreateTab) -> NativeResult<NativeTab>;

    async fn remove_tab(&self, tab_id: TabId) -> NativeResult<()>;

    async fn update_tab(&self, tab_id: TabId, update: UpdateTab) -> NativeResult<NativeTab>;

    /// Move a tab to `index` within `window_id` (attaching it if it lives elsewhere).
    async fn move_tab(&self, tab_id: TabId, window_id: WindowId, index: usize) -> NativeResult<()>;

    async fn activate_tab(&self, tab_id: TabId) -> NativeResult<()> {
        self.update_tab(
            tab_id,
            UpdateTab {
                active: Some(true),
                ..Default::default()
            },
        )
        .await
        .map(|_| ())
    }
}

/// Window half of the native API.
#[async_trait]
pub trait WindowApi: Send + Sync {
    async fn query_windows(&self) -> NativeResult<Vec<NativeWindow>>;

    /// Open a new window, optionally moving `tab_id` into it.
    async fn create_window(&self, tab_id: Option<TabId>) -> NativeResult<NativeWindow>;

    async fn remove_window(&self, window_id: WindowId) -> NativeResult<()>;

    async fn update_window(&self, window_id: WindowId, focused: bool) -> NativeResult<()>;
}

/// The full native surface the engine consumes.
pub trait NativeApi: TabApi + WindowApi {}

impl<T: TabApi + WindowApi> NativeApi for T {}

/// Persistent key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;

    async fn set(&self, key: &str, value: serde_json::Value) -> StorageResult<()>;
}
