//! Records and events reported by the host browser.

use serde::{Deserialize, Serialize};

use crate::ids::{TabId, WindowId};

/// A tab as reported by the native tab query API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTab {
    pub id: TabId,
    pub window_id: WindowId,
    /// Zero-based position within the window's tab strip.
    pub index: usize,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub discarded: bool,
    #[serde(default)]
    pub opener_tab_id: Option<TabId>,
}

impl NativeTab {
    /// Create a tab record with empty url/title and all flags cleared.
    pub fn new(id: TabId, window_id: WindowId, index: usize) -> Self {
        Self {
            id,
            window_id,
            index,
            url: String::new(),
            title: String::new(),
            pinned: false,
            active: false,
            discarded: false,
            opener_tab_id: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_opener(mut self, opener: TabId) -> Self {
        self.opener_tab_id = Some(opener);
        self
    }
}

/// A window as reported by the native window query API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeWindow {
    pub id: WindowId,
    #[serde(default)]
    pub focused: bool,
}

/// Field changes carried by a tab-updated event. `None` means unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discarded: Option<bool>,
}

impl TabChange {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.title.is_none() && self.pinned.is_none() && self.discarded.is_none()
    }
}

/// Lifecycle notification delivered by the host browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NativeEvent {
    TabCreated {
        tab: NativeTab,
    },
    TabRemoved {
        tab_id: TabId,
        window_id: WindowId,
        #[serde(default)]
        window_closing: bool,
    },
    TabUpdated {
        tab_id: TabId,
        change: TabChange,
    },
    TabMoved {
        tab_id: TabId,
        window_id: WindowId,
        from_index: usize,
        to_index: usize,
    },
    TabAttached {
        tab_id: TabId,
        window_id: WindowId,
        position: usize,
    },
    TabDetached {
        tab_id: TabId,
        window_id: WindowId,
        position: usize,
    },
    TabActivated {
        tab_id: TabId,
        window_id: WindowId,
    },
    TabReplaced {
        added: TabId,
        removed: TabId,
    },
    WindowCreated {
        window_id: WindowId,
    },
    WindowRemoved {
        window_id: WindowId,
    },
}

impl NativeEvent {
    /// Short event name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            NativeEvent::TabCreated { .. } => "tab_created",
            NativeEvent::TabRemoved { .. } => "tab_removed",
            NativeEvent::TabUpdated { .. } => "tab_updated",
            NativeEvent::TabMoved { .. } => "tab_moved",
            NativeEvent::TabAttached { .. } => "tab_attached",
            NativeEvent::TabDetached { .. } => "tab_detached",
            NativeEvent::TabActivated { .. } => "tab_activated",
            NativeEvent::TabReplaced { .. } => "tab_replaced",
            NativeEvent::WindowCreated { .. } => "window_created",
            NativeEvent::WindowRemoved { .. } => "window_removed",
        }
    }
}
