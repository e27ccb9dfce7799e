//! Flattening the tree into the native tab-strip order.

use tabtree_types::{NodeId, TabId, WindowId};

use crate::store::TreeStore;

impl TreeStore {
    /// Node ids of a window in native order: pinned list first, then each
    /// view in view order as a pre-order traversal of its forest.
    pub fn flatten(&self, window_id: WindowId) -> Vec<NodeId> {
        let Some(window) = self.window(window_id) else {
            return Vec::new();
        };
        let mut order = window.pinned.clone();
        for view in &window.views {
            order.extend(self.view_pre_order(window_id, &view.id));
        }
        order
    }

    /// Tab ids of a window in the order the tree implies for the native strip.
    pub fn native_order(&self, window_id: WindowId) -> Vec<TabId> {
        self.flatten(window_id)
            .into_iter()
            .filter_map(|id| self.node(id).map(|n| n.tab_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Placement;
    use tabtree_types::NativeTab;

    const W: WindowId = WindowId(1);

    #[test]
    fn test_pinned_first_then_depth_first() {
        let mut store = TreeStore::new();
        let active = |id: i64| NativeTab::new(TabId(id), W, 0).with_active(true);
        store.create_node(&active(1), Placement::End).unwrap();
        store.create_node(&active(2), Placement::Child(TabId(1))).unwrap();
        store.create_node(&active(3), Placement::End).unwrap();
        store.create_node(&active(4), Placement::Child(TabId(2))).unwrap();
        store.create_node(&active(5), Placement::Child(TabId(1))).unwrap();
        store
            .create_node(&active(6).with_pinned(true), Placement::End)
            .unwrap();

        let order: Vec<i64> = store.native_order(W).into_iter().map(|t| t.0).collect();
        assert_eq!(order, vec![6, 1, 2, 4, 5, 3]);
    }

    #[test]
    fn test_views_flatten_in_view_order() {
        let mut store = TreeStore::new();
        let active = |id: i64| NativeTab::new(TabId(id), W, 0).with_active(true);
        store.create_node(&active(1), Placement::End).unwrap();
        let second = store.create_view(W, "Second").unwrap();
        store.set_active_view(W, &second).unwrap();
        store.create_node(&active(2), Placement::End).unwrap();
        store.set_active_view(W, &tabtree_types::ViewId::default_view()).unwrap();
        store.create_node(&active(3), Placement::End).unwrap();

        let order: Vec<i64> = store.native_order(W).into_iter().map(|t| t.0).collect();
        assert_eq!(order, vec![1, 3, 2]);
    }

    #[test]
    fn test_unknown_window_is_empty() {
        assert!(TreeStore::new().native_order(WindowId(9)).is_empty());
    }
}
