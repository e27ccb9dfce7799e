//! Tree records: nodes, views, and per-window state.

use serde::{Deserialize, Serialize};
use tabtree_types::{NativeTab, NodeId, TabId, ViewId, WindowId};

/// One entry in the tree, wrapping exactly one live native tab.
///
/// The node holds only a plain id reference to its parent. Child order lives
/// in the store's child index (or the view's root list for roots), so a node's
/// position among its siblings is derived, never stored on the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub tab_id: TabId,
    pub window_id: WindowId,
    pub parent_id: Option<NodeId>,
    /// 0 for roots and pinned nodes, parent depth + 1 otherwise.
    pub depth: u32,
    pub expanded: bool,
    pub pinned: bool,
    /// Owning view. Pinned nodes keep their last view so unpinning can return them.
    pub view_id: ViewId,
    pub url: String,
    pub title: String,
    pub discarded: bool,
}

impl Node {
    pub(crate) fn from_tab(id: NodeId, tab: &NativeTab, view_id: ViewId) -> Self {
        Self {
            id,
            tab_id: tab.id,
            window_id: tab.window_id,
            parent_id: None,
            depth: 0,
            expanded: true,
            pinned: tab.pinned,
            view_id,
            url: tab.url.clone(),
            title: tab.title.clone(),
            discarded: tab.discarded,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A named partition of a window's root-level nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: ViewId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Root nodes in display order.
    #[serde(rename = "rootIds", default)]
    pub roots: Vec<NodeId>,
}

impl View {
    pub fn new(id: ViewId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: None,
            roots: Vec::new(),
        }
    }

    /// The view a window starts with.
    pub fn default_view() -> Self {
        Self::new(ViewId::default_view(), "Default")
    }
}

/// Views, pinned list, and focus state of one native window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowState {
    pub id: WindowId,
    /// Never empty.
    pub views: Vec<View>,
    pub pinned: Vec<NodeId>,
    pub active_view: ViewId,
    pub active_tab: Option<TabId>,
}

impl WindowState {
    pub fn new(id: WindowId) -> Self {
        let view = View::default_view();
        Self {
            id,
            active_view: view.id.clone(),
            views: vec![view],
            pinned: Vec::new(),
            active_tab: None,
        }
    }

    pub fn view(&self, id: &ViewId) -> Option<&View> {
        self.views.iter().find(|v| &v.id == id)
    }

    pub(crate) fn view_mut(&mut self, id: &ViewId) -> Option<&mut View> {
        self.views.iter_mut().find(|v| &v.id == id)
    }

    pub fn has_view(&self, id: &ViewId) -> bool {
        self.view(id).is_some()
    }

    /// The view that receives unanchored new tabs.
    pub fn active_view_id(&self) -> ViewId {
        if self.has_view(&self.active_view) {
            self.active_view.clone()
        } else {
            self.first_view_id()
        }
    }

    pub fn first_view_id(&self) -> ViewId {
        self.views
            .first()
            .map(|v| v.id.clone())
            .unwrap_or_else(ViewId::default_view)
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty() && self.views.iter().all(|v| v.roots.is_empty())
    }
}

/// Where a new node goes relative to the existing tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Append to the end of the window's active view roots.
    End,
    /// Last child of the anchor tab.
    Child(TabId),
    /// Immediately after the anchor tab, under the anchor's parent.
    Sibling(TabId),
    /// Root directly after the root ancestor of the given tab, or first root of
    /// the active view when `None`.
    RootAfter(Option<TabId>),
}

/// Position among the children of a new parent (or among roots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tab")]
pub enum InsertPosition {
    FirstChild,
    LastChild,
    Before(TabId),
    After(TabId),
}

/// Placement relative to a sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Before,
    After,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_window_has_default_view() {
        let window = WindowState::new(WindowId(1));
        assert_eq!(window.views.len(), 1);
        assert_eq!(window.active_view_id(), ViewId::default_view());
        assert!(window.is_empty());
    }

    #[test]
    fn test_active_view_falls_back_to_first() {
        let mut window = WindowState::new(WindowId(1));
        window.active_view = ViewId::new("gone");
        assert_eq!(window.active_view_id(), ViewId::default_view());
    }

    #[test]
    fn test_insert_position_wire_format() {
        let json = serde_json::to_value(InsertPosition::Before(TabId(4))).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "before", "tab": 4 }));
        let json = serde_json::to_value(InsertPosition::FirstChild).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "first_child" }));
    }
}
