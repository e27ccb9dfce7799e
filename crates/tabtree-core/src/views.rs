//! Window and view management.

use tabtree_types::{TabId, ViewId, WindowId};
use tracing::debug;

use crate::error::{Result, TreeError};
use crate::node::View;
use crate::store::TreeStore;

impl TreeStore {
    /// Make sure a window has state. Returns `true` if it was created.
    pub fn ensure_window(&mut self, window_id: WindowId) -> Result<bool> {
        if self.windows.contains_key(&window_id) {
            return Ok(false);
        }
        self.transact("ensure_window", |store| {
            store.ensure_window_state(window_id);
            Ok(true)
        })
    }

    /// Drop a window and every node in it. Returns the removed tab ids.
    pub fn remove_window(&mut self, window_id: WindowId) -> Result<Vec<TabId>> {
        self.transact("remove_window", |store| {
            let window = store
                .windows
                .remove(&window_id)
                .ok_or(TreeError::UnknownWindow(window_id))?;
            let ids: Vec<_> = window
                .pinned
                .iter()
                .copied()
                .chain(window.views.iter().flat_map(|v| {
                    v.roots.iter().flat_map(|root| store.subtree(*root))
                }))
                .collect();

            let mut removed = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(node) = store.nodes.remove(&id) {
                    store.tab_to_node.remove(&node.tab_id);
                    store.unread.clear(id);
                    removed.push(node.tab_id);
                }
                store.children.remove(&id);
            }
            debug!(window_id = %window_id, tabs = removed.len(), "Window state dropped");
            Ok(removed)
        })
    }

    /// Add an empty view to a window.
    pub fn create_view(&mut self, window_id: WindowId, name: &str) -> Result<ViewId> {
        self.transact("create_view", |store| {
            let window = store.window_mut(window_id)?;
            let id = ViewId::new(uuid::Uuid::new_v4().to_string());
            window.views.push(View::new(id.clone(), name));
            Ok(id)
        })
    }

    pub fn rename_view(&mut self, window_id: WindowId, view_id: &ViewId, name: &str) -> Result<()> {
        self.transact("rename_view", |store| {
            let view = store
                .window_mut(window_id)?
                .view_mut(view_id)
                .ok_or_else(|| TreeError::UnknownView {
                    window: window_id,
                    view: view_id.clone(),
                })?;
            view.name = name.to_string();
            Ok(())
        })
    }

    /// Remove a view. Its roots move to the end of the window's first remaining
    /// view. A window's last view cannot be removed.
    pub fn remove_view(&mut self, window_id: WindowId, view_id: &ViewId) -> Result<()> {
        self.transact("remove_view", |store| {
            let window = store.window_mut(window_id)?;
            if !window.has_view(view_id) {
                return Err(TreeError::UnknownView {
                    window: window_id,
                    view: view_id.clone(),
                });
            }
            if window.views.len() == 1 {
                return Err(TreeError::LastView(window_id));
            }

            let index = window
                .views
                .iter()
                .position(|v| &v.id == view_id)
                .ok_or(TreeError::UnknownView {
                    window: window_id,
                    view: view_id.clone(),
                })?;
            let removed = window.views.remove(index);
            let target = window.first_view_id();
            if &window.active_view == view_id {
                window.active_view = target.clone();
            }
            if let Some(view) = window.view_mut(&target) {
                view.roots.extend(removed.roots.iter().copied());
            }
            let pinned = window.pinned.clone();

            for root in &removed.roots {
                store.node_mut(*root)?.view_id = target.clone();
                store.refresh_subtree(*root)?;
            }
            for id in pinned {
                let node = store.node_mut(id)?;
                if &node.view_id == view_id {
                    node.view_id = target.clone();
                }
            }
            Ok(())
        })
    }

    /// Select the view that receives unanchored new tabs.
    pub fn set_active_view(&mut self, window_id: WindowId, view_id: &ViewId) -> Result<()> {
        self.transact("set_active_view", |store| {
            let window = store.window_mut(window_id)?;
            if !window.has_view(view_id) {
                return Err(TreeError::UnknownView {
                    window: window_id,
                    view: view_id.clone(),
                });
            }
            window.active_view = view_id.clone();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Placement;
    use tabtree_types::NativeTab;

    const W: WindowId = WindowId(1);

    fn tab(id: i64) -> NativeTab {
        NativeTab::new(TabId(id), W, 0).with_active(true)
    }

    #[test]
    fn test_new_tabs_join_active_view() {
        let mut store = TreeStore::new();
        store.ensure_window(W).unwrap();
        let work = store.create_view(W, "Work").unwrap();
        store.set_active_view(W, &work).unwrap();
        store.create_node(&tab(1), Placement::End).unwrap();

        let window = store.window(W).unwrap();
        assert_eq!(window.views.len(), 2);
        assert!(window.views[0].roots.is_empty());
        assert_eq!(window.views[1].roots.len(), 1);
        assert_eq!(store.node_for_tab(TabId(1)).unwrap().view_id, work);
    }

    #[test]
    fn test_remove_view_moves_roots_to_first_view() {
        let mut store = TreeStore::new();
        store.create_node(&tab(1), Placement::End).unwrap();
        let work = store.create_view(W, "Work").unwrap();
        store.set_active_view(W, &work).unwrap();
        store.create_node(&tab(2), Placement::End).unwrap();
        store.create_node(&tab(3), Placement::Child(TabId(2))).unwrap();

        store.remove_view(W, &work).unwrap();
        let window = store.window(W).unwrap();
        assert_eq!(window.views.len(), 1);
        assert_eq!(window.active_view, ViewId::default_view());
        assert_eq!(window.views[0].roots.len(), 2);
        assert_eq!(
            store.node_for_tab(TabId(3)).unwrap().view_id,
            ViewId::default_view()
        );
    }

    #[test]
    fn test_last_view_cannot_be_removed() {
        let mut store = TreeStore::new();
        store.ensure_window(W).unwrap();
        let err = store.remove_view(W, &ViewId::default_view()).unwrap_err();
        assert_eq!(err, TreeError::LastView(W));
    }

    #[test]
    fn test_rename_view() {
        let mut store = TreeStore::new();
        store.ensure_window(W).unwrap();
        store
            .rename_view(W, &ViewId::default_view(), "Home")
            .unwrap();
        assert_eq!(store.window(W).unwrap().views[0].name, "Home");
        assert!(
            store
                .rename_view(W, &ViewId::new("missing"), "x")
                .is_err()
        );
    }

    #[test]
    fn test_remove_window_drops_nodes() {
        let mut store = TreeStore::new();
        store.create_node(&tab(1), Placement::End).unwrap();
        store.create_node(&tab(2), Placement::Child(TabId(1))).unwrap();
        store
            .create_node(&NativeTab::new(TabId(3), WindowId(2), 0), Placement::End)
            .unwrap();

        let mut removed = store.remove_window(W).unwrap();
        removed.sort();
        assert_eq!(removed, vec![TabId(1), TabId(2)]);
        assert_eq!(store.len(), 1);
        assert!(store.window(W).is_none());
        assert!(store.remove_window(W).is_err());
    }
}
