//! Startup reconciliation of a persisted snapshot against the live tab list.

use std::collections::{BTreeSet, HashMap};

use tabtree_types::{NativeTab, TabChange, TabId, WindowId};
use tracing::debug;

use crate::node::Placement;
use crate::snapshot::TreeSnapshot;
use crate::store::TreeStore;

/// What startup reconciliation changed relative to the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Snapshot entries that had to be dropped or repaired.
    pub warnings: Vec<String>,
    /// Snapshot tabs that are no longer open.
    pub dropped: Vec<TabId>,
    /// Live tabs that were missing from the snapshot.
    pub created: Vec<TabId>,
    /// Tabs that now live in a different window than recorded.
    pub moved: Vec<TabId>,
    /// Live tabs excluded from the tree (the engine's own UI surface).
    pub excluded: Vec<TabId>,
    /// Persisted unread ids that still refer to a live tab.
    pub unread_restored: usize,
}

impl TreeStore {
    /// Build the startup tree from the last snapshot and the tabs that are
    /// open right now.
    ///
    /// Never fails: unusable snapshot entries are dropped with a warning, dead
    /// tabs are removed (with promotion), and untracked live tabs are added as
    /// roots in native order without being marked unread.
    pub fn restore(
        snapshot: Option<&TreeSnapshot>,
        live: &[NativeTab],
        unread: &[TabId],
        exclude: impl Fn(&NativeTab) -> bool,
    ) -> (TreeStore, RestoreReport) {
        let (mut store, warnings) = snapshot
            .map(TreeStore::from_snapshot)
            .unwrap_or_else(|| (TreeStore::new(), Vec::new()));
        let mut report = RestoreReport {
            warnings,
            ..Default::default()
        };
        store.set_restoring(true);

        let mut tabs: Vec<&NativeTab> = Vec::with_capacity(live.len());
        for tab in live {
            if exclude(tab) {
                report.excluded.push(tab.id);
            } else {
                tabs.push(tab);
            }
        }
        tabs.sort_by_key(|t| (t.window_id, t.index));
        let by_id: HashMap<TabId, &NativeTab> = tabs.iter().map(|t| (t.id, *t)).collect();

        match store.retain_tabs(|tab| by_id.contains_key(&tab)) {
            Ok(dropped) => report.dropped = dropped,
            Err(e) => report.warnings.push(format!("failed to prune closed tabs: {e}")),
        }

        let mut previous: Option<(WindowId, TabId)> = None;
        for tab in &tabs {
            let after = previous
                .filter(|(window, _)| *window == tab.window_id)
                .map(|(_, prev)| prev);
            previous = Some((tab.window_id, tab.id));
            let placement = Placement::RootAfter(after);

            let result = match store.node_for_tab(tab.id).map(|n| n.window_id) {
                None => store.create_node(tab, placement).map(|_| {
                    report.created.push(tab.id);
                }),
                Some(window) if window != tab.window_id => {
                    store.attach_to_window(tab, placement).map(|_| {
                        report.moved.push(tab.id);
                    })
                }
                Some(_) => Ok(()),
            };
            if let Err(e) = result {
                report.warnings.push(format!("tab {}: {e}", tab.id));
            }
        }

        for tab in &tabs {
            let Some(node) = store.node_for_tab(tab.id) else {
                continue;
            };
            if node.pinned != tab.pinned
                && let Err(e) = store.set_pinned(tab.id, tab.pinned)
            {
                report.warnings.push(format!("tab {}: {e}", tab.id));
            }
            let change = TabChange {
                url: Some(tab.url.clone()),
                title: Some(tab.title.clone()),
                pinned: None,
                discarded: Some(tab.discarded),
            };
            if let Err(e) = store.update_tab(tab.id, &change) {
                report.warnings.push(format!("tab {}: {e}", tab.id));
            }
            if tab.active
                && let Err(e) = store.activate(tab.id)
            {
                report.warnings.push(format!("tab {}: {e}", tab.id));
            }
        }

        let live_windows: BTreeSet<WindowId> = tabs.iter().map(|t| t.window_id).collect();
        for window in store.window_ids() {
            let empty = store.window(window).is_some_and(|w| w.is_empty());
            if !live_windows.contains(&window)
                && empty
                && let Err(e) = store.remove_window(window)
            {
                report.warnings.push(format!("window {window}: {e}"));
            }
        }

        for tab in unread {
            if let Some(id) = store.node_id_for_tab(*tab) {
                store.unread.mark(id);
                report.unread_restored += 1;
            }
        }

        let violations = store.check_invariants();
        if !violations.is_empty() {
            report.warnings.extend(violations);
        }

        store.set_restoring(false);
        debug!(
            dropped = report.dropped.len(),
            created = report.created.len(),
            moved = report.moved.len(),
            "Restore reconciled snapshot with live tabs"
        );
        (store, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: WindowId = WindowId(1);

    fn live(id: i64, index: usize) -> NativeTab {
        NativeTab::new(TabId(id), W, index).with_url(format!("https://site/{id}"))
    }

    fn saved_tree() -> TreeSnapshot {
        let mut store = TreeStore::new();
        store.set_restoring(true);
        store.create_node(&live(1, 0), Placement::End).unwrap();
        store.create_node(&live(2, 1), Placement::Child(TabId(1))).unwrap();
        store.create_node(&live(3, 2), Placement::Child(TabId(2))).unwrap();
        store.create_node(&live(4, 3), Placement::End).unwrap();
        store.snapshot()
    }

    #[test]
    fn test_no_snapshot_creates_roots_in_native_order() {
        let tabs = vec![live(5, 1), live(4, 0), live(6, 2)];
        let (store, report) = TreeStore::restore(None, &tabs, &[], |_| false);
        assert_eq!(store.native_order(W), vec![TabId(4), TabId(5), TabId(6)]);
        assert_eq!(report.created.len(), 3);
        assert!(store.unread().is_empty());
        assert!(!store.is_restoring());
    }

    #[test]
    fn test_dead_tabs_dropped_with_promotion() {
        let snapshot = saved_tree();
        let tabs = vec![live(1, 0), live(3, 1), live(4, 2)];
        let (store, report) = TreeStore::restore(Some(&snapshot), &tabs, &[], |_| false);

        assert_eq!(report.dropped, vec![TabId(2)]);
        let three = store.node_for_tab(TabId(3)).unwrap();
        assert_eq!(three.parent_id, store.node_id_for_tab(TabId(1)));
        assert_eq!(three.depth, 1);
        assert!(store.check_invariants().is_empty());
    }

    #[test]
    fn test_untracked_live_tab_inserted_after_native_predecessor() {
        let snapshot = saved_tree();
        let tabs = vec![
            live(1, 0),
            live(2, 1),
            live(3, 2),
            live(9, 3),
            live(4, 4),
        ];
        let (store, report) = TreeStore::restore(Some(&snapshot), &tabs, &[], |_| false);
        assert_eq!(report.created, vec![TabId(9)]);
        assert!(store.node_for_tab(TabId(9)).unwrap().is_root());
        assert_eq!(
            store.native_order(W),
            vec![TabId(1), TabId(2), TabId(3), TabId(9), TabId(4)]
        );
        assert!(!store.is_unread(TabId(9)));
    }

    #[test]
    fn test_excluded_and_pinned_mismatch() {
        let snapshot = saved_tree();
        let panel = live(8, 0).with_url("chrome-extension://abc/sidepanel.html");
        let tabs = vec![
            panel,
            live(4, 1).with_pinned(true),
            live(1, 2),
            live(2, 3),
            live(3, 4),
        ];
        let (store, report) =
            TreeStore::restore(Some(&snapshot), &tabs, &[], |t| t.url.contains("sidepanel"));
        assert_eq!(report.excluded, vec![TabId(8)]);
        assert!(!store.contains_tab(TabId(8)));
        assert!(store.node_for_tab(TabId(4)).unwrap().pinned);
        assert_eq!(store.native_order(W)[0], TabId(4));
    }

    #[test]
    fn test_unread_restored_only_for_live_tabs() {
        let snapshot = saved_tree();
        let tabs = vec![live(1, 0), live(2, 1), live(3, 2), live(4, 3)];
        let (store, report) =
            TreeStore::restore(Some(&snapshot), &tabs, &[TabId(3), TabId(42)], |_| false);
        assert_eq!(report.unread_restored, 1);
        assert!(store.is_unread(TabId(3)));
        assert_eq!(store.unread_tab_ids(), vec![TabId(3)]);
    }

    #[test]
    fn test_tab_in_new_window_is_moved() {
        let snapshot = saved_tree();
        let tabs = vec![
            live(1, 0),
            live(2, 1),
            live(3, 2),
            NativeTab::new(TabId(4), WindowId(2), 0),
        ];
        let (store, report) = TreeStore::restore(Some(&snapshot), &tabs, &[], |_| false);
        assert_eq!(report.moved, vec![TabId(4)]);
        assert_eq!(store.native_order(WindowId(2)), vec![TabId(4)]);
    }

    #[test]
    fn test_closed_window_state_removed() {
        let mut store = TreeStore::new();
        store
            .create_node(&NativeTab::new(TabId(1), WindowId(7), 0), Placement::End)
            .unwrap();
        let snapshot = store.snapshot();
        let (store, _) = TreeStore::restore(Some(&snapshot), &[live(2, 0)], &[], |_| false);
        assert!(store.window(WindowId(7)).is_none());
        assert_eq!(store.window_ids(), vec![W]);
    }
}
