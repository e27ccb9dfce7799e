//! Mutation API: the only way the tree changes.
//!
//! Every public operation here is atomic. It either succeeds with all
//! invariants holding or fails with the store exactly as it was.

use tabtree_types::{NativeTab, NodeId, TabChange, TabId, ViewId, WindowId};
use tracing::{debug, trace};

use crate::error::{Result, TreeError};
use crate::node::{InsertPosition, Node, Placement, Relation};
use crate::store::TreeStore;

/// Resolved destination of a new node.
enum Anchor {
    End,
    FirstRoot,
    ChildOf(NodeId),
    After(NodeId),
}

impl TreeStore {
    /// Create a node for a newly reported tab.
    ///
    /// Pinned tabs join the window's pinned list at their native index. Other
    /// tabs are placed per `placement`; an anchor that is unknown, pinned, or in
    /// another window falls back to appending at the end. Background tabs are
    /// marked unread unless the store is restoring existing tabs.
    pub fn create_node(&mut self, tab: &NativeTab, placement: Placement) -> Result<NodeId> {
        self.transact("create_node", |store| store.insert_node(tab, placement))
    }

    pub(crate) fn insert_node(&mut self, tab: &NativeTab, placement: Placement) -> Result<NodeId> {
        if self.contains_tab(tab.id) {
            return Err(TreeError::DuplicateTab(tab.id));
        }

        let view_id = self.ensure_window_state(tab.window_id).active_view_id();
        let id = self.alloc_node_id();
        let mut node = Node::from_tab(id, tab, view_id);

        let index = if tab.pinned {
            Some(tab.index)
        } else {
            match self.resolve_anchor(tab.window_id, placement) {
                Anchor::End => None,
                Anchor::FirstRoot => {
                    if let Some(window) = self.window(tab.window_id) {
                        node.view_id = window.first_view_id();
                    }
                    Some(0)
                }
                Anchor::ChildOf(parent) => {
                    node.parent_id = Some(parent);
                    None
                }
                Anchor::After(sibling) => {
                    let sibling_node = self.require_node(sibling)?;
                    node.parent_id = sibling_node.parent_id;
                    node.view_id = sibling_node.view_id.clone();
                    self.child_order(sibling).map(|i| i + 1)
                }
            }
        };

        self.nodes.insert(id, node);
        self.tab_to_node.insert(tab.id, id);
        self.attach_at(id, index)?;
        self.refresh_subtree(id)?;

        if tab.active {
            self.window_mut(tab.window_id)?.active_tab = Some(tab.id);
        } else if !self.restoring {
            self.unread.mark(id);
        }

        trace!(tab_id = %tab.id, node_id = %id, window_id = %tab.window_id, "Node created");
        Ok(id)
    }

    fn resolve_anchor(&self, window_id: WindowId, placement: Placement) -> Anchor {
        let usable = |tab: TabId| {
            self.node_for_tab(tab)
                .filter(|n| !n.pinned && n.window_id == window_id)
                .map(|n| n.id)
        };

        match placement {
            Placement::End => Anchor::End,
            Placement::Child(tab) => usable(tab).map_or_else(
                || {
                    debug!(anchor = %tab, "Placement anchor unusable, appending at end");
                    Anchor::End
                },
                Anchor::ChildOf,
            ),
            Placement::Sibling(tab) => usable(tab).map_or_else(
                || {
                    debug!(anchor = %tab, "Placement anchor unusable, appending at end");
                    Anchor::End
                },
                Anchor::After,
            ),
            Placement::RootAfter(Some(tab)) => usable(tab)
                .map(|id| Anchor::After(self.root_of(id)))
                .unwrap_or(Anchor::FirstRoot),
            Placement::RootAfter(None) => Anchor::FirstRoot,
        }
    }

    /// Remove a tab's node, promoting its direct children into its slot.
    pub fn remove_node(&mut self, tab_id: TabId) -> Result<Node> {
        self.transact("remove_node", |store| store.remove_node_inner(tab_id))
    }

    pub(crate) fn remove_node_inner(&mut self, tab_id: TabId) -> Result<Node> {
        let id = self.require_tab(tab_id)?;
        self.promote_children(id)?;
        let node = self.forget(id)?;
        trace!(tab_id = %tab_id, node_id = %id, "Node removed");
        Ok(node)
    }

    /// Remove every node whose tab fails `keep`. Returns the removed tab ids.
    pub fn retain_tabs(&mut self, mut keep: impl FnMut(TabId) -> bool) -> Result<Vec<TabId>> {
        let stale: Vec<TabId> = self.tab_ids().filter(|t| !keep(*t)).collect();
        if stale.is_empty() {
            return Ok(stale);
        }
        self.transact("retain_tabs", |store| {
            for tab in &stale {
                store.remove_node_inner(*tab)?;
            }
            Ok(stale)
        })
    }

    /// Move a subtree under a new parent (or to the root level) at `position`.
    ///
    /// `Before`/`After` targets must already be children of the new parent (or
    /// roots, when `new_parent` is `None`; the subtree then joins the target's view).
    pub fn reparent(
        &mut self,
        child: TabId,
        new_parent: Option<TabId>,
        position: InsertPosition,
    ) -> Result<()> {
        self.transact("reparent", |store| {
            let child_id = store.require_tab(child)?;
            let (window_id, current_view) = {
                let node = store.require_node(child_id)?;
                if node.pinned {
                    return Err(TreeError::PinnedTab(child));
                }
                (node.window_id, node.view_id.clone())
            };

            let parent_id = match new_parent {
                Some(parent) => {
                    let parent_id = store.require_tab(parent)?;
                    let parent_node = store.require_node(parent_id)?;
                    if parent_node.pinned {
                        return Err(TreeError::PinnedTab(parent));
                    }
                    if parent_node.window_id != window_id {
                        return Err(TreeError::WindowMismatch {
                            tab: parent,
                            window: window_id,
                        });
                    }
                    if parent_id == child_id || store.is_ancestor(child_id, parent_id) {
                        return Err(TreeError::Cycle { child, parent });
                    }
                    Some(parent_id)
                }
                None => None,
            };

            let target = match position {
                InsertPosition::Before(target) | InsertPosition::After(target) => {
                    let target_id = store.require_tab(target)?;
                    let target_node = store.require_node(target_id)?;
                    if target_id == child_id
                        || target_node.pinned
                        || target_node.window_id != window_id
                        || target_node.parent_id != parent_id
                    {
                        return Err(TreeError::InvalidTarget(format!(
                            "tab {target} is not a child of the new parent"
                        )));
                    }
                    Some(target_id)
                }
                InsertPosition::FirstChild | InsertPosition::LastChild => None,
            };

            let view_id = match (parent_id, target) {
                (Some(parent), _) => store.require_node(parent)?.view_id.clone(),
                (None, Some(target)) => store.require_node(target)?.view_id.clone(),
                (None, None) => current_view,
            };

            store.detach(child_id)?;
            {
                let node = store.node_mut(child_id)?;
                node.parent_id = parent_id;
                node.view_id = view_id;
            }

            let index = match (position, target) {
                (InsertPosition::FirstChild, _) => Some(0),
                (InsertPosition::LastChild, _) => None,
                (InsertPosition::Before(_), Some(target)) => store.child_order(target),
                (InsertPosition::After(_), Some(target)) => store.child_order(target).map(|i| i + 1),
                _ => None,
            };
            store.attach_at(child_id, index)?;
            store.refresh_subtree(child_id)
        })
    }

    /// Reposition a node among its current siblings.
    pub fn reorder_siblings(&mut self, tab: TabId, target: TabId, relation: Relation) -> Result<()> {
        self.transact("reorder_siblings", |store| {
            let id = store.require_tab(tab)?;
            let target_id = store.require_tab(target)?;
            if id == target_id {
                return Err(TreeError::InvalidTarget(format!("tab {tab} cannot move relative to itself")));
            }
            let node = store.require_node(id)?;
            let target_node = store.require_node(target_id)?;
            if node.pinned {
                return Err(TreeError::PinnedTab(tab));
            }
            if target_node.pinned {
                return Err(TreeError::PinnedTab(target));
            }
            let same_list = node.parent_id == target_node.parent_id
                && node.window_id == target_node.window_id
                && (node.parent_id.is_some() || node.view_id == target_node.view_id);
            if !same_list {
                return Err(TreeError::NotSiblings(tab, target));
            }

            store.detach(id)?;
            store.insert_relative(id, target_id, relation)
        })
    }

    /// Move a tab between the tree and its window's pinned list.
    ///
    /// Pinning promotes the node's children into its slot and appends it to the
    /// pinned list. Unpinning appends it to the roots of its last view. Returns
    /// whether anything changed.
    pub fn set_pinned(&mut self, tab: TabId, pinned: bool) -> Result<bool> {
        let id = self.require_tab(tab)?;
        if self.require_node(id)?.pinned == pinned {
            return Ok(false);
        }

        self.transact("set_pinned", |store| {
            if pinned {
                store.promote_children(id)?;
            } else {
                store.detach(id)?;
            }

            let window_id = store.require_node(id)?.window_id;
            let fallback_view = store
                .window(window_id)
                .map(|w| w.active_view_id())
                .ok_or(TreeError::UnknownWindow(window_id))?;
            let view_exists = {
                let view_id = &store.require_node(id)?.view_id;
                store.window(window_id).is_some_and(|w| w.has_view(view_id))
            };

            let node = store.node_mut(id)?;
            node.pinned = pinned;
            node.parent_id = None;
            node.depth = 0;
            if !view_exists {
                node.view_id = fallback_view;
            }

            store.attach_at(id, None)?;
            store.refresh_subtree(id)?;
            Ok(true)
        })
    }

    /// Reorder the pinned list only.
    pub fn move_pinned(&mut self, tab: TabId, target: TabId, relation: Relation) -> Result<()> {
        self.transact("move_pinned", |store| {
            let id = store.require_tab(tab)?;
            let target_id = store.require_tab(target)?;
            let node = store.require_node(id)?;
            let target_node = store.require_node(target_id)?;
            if !node.pinned {
                return Err(TreeError::NotPinned(tab));
            }
            if !target_node.pinned {
                return Err(TreeError::NotPinned(target));
            }
            if node.window_id != target_node.window_id {
                return Err(TreeError::WindowMismatch {
                    tab: target,
                    window: node.window_id,
                });
            }
            if id == target_id {
                return Err(TreeError::InvalidTarget(format!("tab {tab} cannot move relative to itself")));
            }

            store.detach(id)?;
            store.insert_relative(id, target_id, relation)
        })
    }

    /// Adopt the relative order of pinned tabs from a native ordering of the window.
    ///
    /// Pinned nodes missing from `native_order` keep their relative position at
    /// the end. Returns whether the pinned list changed.
    pub fn sync_pinned_order(&mut self, window_id: WindowId, native_order: &[TabId]) -> Result<bool> {
        let window = self
            .window(window_id)
            .ok_or(TreeError::UnknownWindow(window_id))?;
        let mut desired: Vec<NodeId> = native_order
            .iter()
            .filter_map(|tab| self.node_id_for_tab(*tab))
            .filter(|id| window.pinned.contains(id))
            .collect();
        for id in &window.pinned {
            if !desired.contains(id) {
                desired.push(*id);
            }
        }
        if desired == window.pinned {
            return Ok(false);
        }

        self.transact("sync_pinned_order", |store| {
            store.window_mut(window_id)?.pinned = desired;
            Ok(true)
        })
    }

    /// Re-root a subtree at the end of another view of the same window.
    pub fn assign_to_view(&mut self, tab: TabId, view_id: &ViewId) -> Result<()> {
        self.transact("assign_to_view", |store| {
            let id = store.require_tab(tab)?;
            let node = store.require_node(id)?;
            if node.pinned {
                return Err(TreeError::PinnedTab(tab));
            }
            let window_id = node.window_id;
            if !store.window(window_id).is_some_and(|w| w.has_view(view_id)) {
                return Err(TreeError::UnknownView {
                    window: window_id,
                    view: view_id.clone(),
                });
            }

            store.detach(id)?;
            let node = store.node_mut(id)?;
            node.parent_id = None;
            node.view_id = view_id.clone();
            store.attach_at(id, None)?;
            store.refresh_subtree(id)
        })
    }

    /// Returns whether the flag changed.
    pub fn set_expanded(&mut self, tab: TabId, expanded: bool) -> Result<bool> {
        let id = self.require_tab(tab)?;
        if self.require_node(id)?.expanded == expanded {
            return Ok(false);
        }
        self.transact("set_expanded", |store| {
            store.node_mut(id)?.expanded = expanded;
            Ok(true)
        })
    }

    /// Apply url/title/discarded changes. Pin changes go through [`set_pinned`](Self::set_pinned).
    pub fn update_tab(&mut self, tab: TabId, change: &TabChange) -> Result<()> {
        self.transact("update_tab", |store| {
            let id = store.require_tab(tab)?;
            let node = store.node_mut(id)?;
            if let Some(url) = &change.url {
                node.url.clone_from(url);
            }
            if let Some(title) = &change.title {
                node.title.clone_from(title);
            }
            if let Some(discarded) = change.discarded {
                node.discarded = discarded;
            }
            Ok(())
        })
    }

    /// Record a tab as its window's active tab and clear its unread flag.
    /// Returns whether the tab was unread.
    pub fn activate(&mut self, tab: TabId) -> Result<bool> {
        self.transact("activate", |store| {
            let id = store.require_tab(tab)?;
            let window_id = store.require_node(id)?.window_id;
            store.window_mut(window_id)?.active_tab = Some(tab);
            Ok(store.unread.clear(id))
        })
    }

    /// Rebind a node to a replacement tab id, keeping its place in the tree.
    pub fn replace_tab_id(&mut self, removed: TabId, added: TabId) -> Result<NodeId> {
        self.transact("replace_tab_id", |store| {
            if store.contains_tab(added) {
                return Err(TreeError::DuplicateTab(added));
            }
            let id = store.require_tab(removed)?;
            store.tab_to_node.remove(&removed);
            store.tab_to_node.insert(added, id);

            let node = store.node_mut(id)?;
            node.tab_id = added;
            let window_id = node.window_id;
            let window = store.window_mut(window_id)?;
            if window.active_tab == Some(removed) {
                window.active_tab = Some(added);
            }
            Ok(id)
        })
    }

    /// Move a tab into another window's state.
    ///
    /// The node leaves its old window with its children promoted, and a fresh
    /// node is created in the new window per `placement`. Url, title, and
    /// unread state carry over.
    pub fn attach_to_window(&mut self, tab: &NativeTab, placement: Placement) -> Result<NodeId> {
        self.transact("attach_to_window", |store| {
            let mut tab = tab.clone();
            let mut was_unread = false;
            if let Some(old) = store.node_id_for_tab(tab.id) {
                was_unread = store.unread.contains(old);
                let node = store.remove_node_inner(tab.id)?;
                if tab.url.is_empty() {
                    tab.url = node.url;
                }
                if tab.title.is_empty() {
                    tab.title = node.title;
                }
                tab.discarded = node.discarded;
            }

            let restoring = std::mem::replace(&mut store.restoring, true);
            let inserted = store.insert_node(&tab, placement);
            store.restoring = restoring;
            let id = inserted?;

            if was_unread {
                store.unread.mark(id);
            }
            Ok(id)
        })
    }

    /// Insert a detached node next to `target` in the target's list.
    fn insert_relative(&mut self, id: NodeId, target: NodeId, relation: Relation) -> Result<()> {
        let index = self
            .child_order(target)
            .ok_or(TreeError::UnknownNode(target))?;
        let index = match relation {
            Relation::Before => index,
            Relation::After => index + 1,
        };
        self.attach_at(id, Some(index))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    const W: WindowId = WindowId(1);

    #[derive(Debug, Clone)]
    enum Op {
        Create {
            tab: i64,
            anchor: Option<i64>,
            sibling: bool,
            pinned: bool,
        },
        Remove(i64),
        Reparent {
            child: i64,
            parent: Option<i64>,
            first: bool,
        },
        Reorder {
            tab: i64,
            target: i64,
            before: bool,
        },
        Pin(i64, bool),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let tab = 1i64..16;
        prop_oneof![
            3 => (tab.clone(), prop::option::of(1i64..16), any::<bool>(), prop::bool::weighted(0.15))
                .prop_map(|(tab, anchor, sibling, pinned)| Op::Create { tab, anchor, sibling, pinned }),
            2 => tab.clone().prop_map(Op::Remove),
            2 => (tab.clone(), prop::option::of(1i64..16), any::<bool>())
                .prop_map(|(child, parent, first)| Op::Reparent { child, parent, first }),
            1 => (tab.clone(), tab.clone(), any::<bool>())
                .prop_map(|(tab, target, before)| Op::Reorder { tab, target, before }),
            1 => (tab, any::<bool>()).prop_map(|(tab, pinned)| Op::Pin(tab, pinned)),
        ]
    }

    fn apply(store: &mut TreeStore, op: &Op) -> Result<()> {
        match *op {
            Op::Create { tab, anchor, sibling, pinned } => {
                let placement = match (anchor, sibling) {
                    (None, _) => Placement::End,
                    (Some(a), false) => Placement::Child(TabId(a)),
                    (Some(a), true) => Placement::Sibling(TabId(a)),
                };
                let native = NativeTab::new(TabId(tab), W, 0).with_pinned(pinned);
                store.create_node(&native, placement).map(|_| ())
            }
            Op::Remove(tab) => store.remove_node(TabId(tab)).map(|_| ()),
            Op::Reparent { child, parent, first } => {
                let position = if first {
                    InsertPosition::FirstChild
                } else {
                    InsertPosition::LastChild
                };
                store.reparent(TabId(child), parent.map(TabId), position)
            }
            Op::Reorder { tab, target, before } => {
                let relation = if before { Relation::Before } else { Relation::After };
                store.reorder_siblings(TabId(tab), TabId(target), relation)
            }
            Op::Pin(tab, pinned) => store.set_pinned(TabId(tab), pinned).map(|_| ()),
        }
    }

    proptest! {
        #[test]
        fn invariants_hold_after_every_operation(ops in prop::collection::vec(op_strategy(), 1..80)) {
            let mut store = TreeStore::new();
            let mut live: BTreeSet<TabId> = BTreeSet::new();

            for op in &ops {
                let order_before = store.native_order(W);
                let revision_before = store.revision();
                let result = apply(&mut store, op);

                match (&result, op) {
                    (Ok(()), Op::Create { tab, .. }) => { live.insert(TabId(*tab)); }
                    (Ok(()), Op::Remove(tab)) => { live.remove(&TabId(*tab)); }
                    (Err(_), _) => {
                        prop_assert_eq!(store.revision(), revision_before);
                        prop_assert_eq!(store.native_order(W), order_before);
                    }
                    _ => {}
                }

                let violations = store.check_invariants();
                prop_assert!(violations.is_empty(), "{:?} after {:?}", violations, op);
                let tracked: BTreeSet<TabId> = store.tab_ids().collect();
                prop_assert_eq!(&tracked, &live);
                prop_assert_eq!(store.native_order(W).len(), live.len());
            }
        }

        #[test]
        fn removal_promotes_children_in_place(children in 0usize..6, before in 0usize..3, after in 0usize..3) {
            let mut store = TreeStore::new();
            let mut next = 1i64;
            let mut add = |store: &mut TreeStore, placement| {
                let id = next;
                next += 1;
                store
                    .create_node(&NativeTab::new(TabId(id), W, 0).with_active(true), placement)
                    .unwrap();
                TabId(id)
            };

            let top = add(&mut store, Placement::End);
            let mut expected: Vec<TabId> = (0..before).map(|_| add(&mut store, Placement::Child(top))).collect();
            let removed = add(&mut store, Placement::Child(top));
            let promoted: Vec<TabId> = (0..children).map(|_| add(&mut store, Placement::Child(removed))).collect();
            let trailing: Vec<TabId> = (0..after).map(|_| add(&mut store, Placement::Child(top))).collect();

            store.remove_node(removed).unwrap();

            expected.extend(promoted);
            expected.extend(trailing);
            let top_id = store.node_id_for_tab(top).unwrap();
            let actual: Vec<TabId> = store
                .children(top_id)
                .iter()
                .map(|id| store.node(*id).unwrap().tab_id)
                .collect();
            prop_assert_eq!(actual, expected);
            prop_assert!(store.nodes().filter(|n| n.tab_id != top).all(|n| n.depth == 1));
        }
    }
}
