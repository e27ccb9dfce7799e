//! The tree store: an arena of nodes keyed by id plus the indexes that give
//! the arena its shape.
//!
//! Ownership of children lives in `children` (and in each view's root list);
//! nodes only carry a plain `parent_id`. All mutation goes through
//! [`TreeStore::transact`], which snapshots the store, runs the operation,
//! checks every structural invariant, and restores the snapshot on failure.

use std::collections::{BTreeMap, HashMap};

use tabtree_types::{NodeId, TabId, ViewId, WindowId};
use tracing::debug;

use crate::error::{Result, TreeError};
use crate::invariants;
use crate::node::{Node, WindowState};
use crate::unread::UnreadTracker;

/// Authoritative in-memory model of every window's tab tree.
#[derive(Debug, Clone, Default)]
pub struct TreeStore {
    pub(crate) next_node_id: u64,
    pub(crate) tab_to_node: BTreeMap<TabId, NodeId>,
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) children: HashMap<NodeId, Vec<NodeId>>,
    pub(crate) windows: BTreeMap<WindowId, WindowState>,
    pub(crate) unread: UnreadTracker,
    pub(crate) restoring: bool,
    pub(crate) revision: u64,
}

impl TreeStore {
    pub fn new() -> Self {
        Self {
            next_node_id: 1,
            ..Default::default()
        }
    }

    // ── Read access ─────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bumped by every successful mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the store is in the startup phase that restores existing tabs.
    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    /// Enter or leave the startup restore phase. Tabs created while restoring
    /// are never marked unread.
    pub fn set_restoring(&mut self, restoring: bool) {
        self.restoring = restoring;
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_id_for_tab(&self, tab_id: TabId) -> Option<NodeId> {
        self.tab_to_node.get(&tab_id).copied()
    }

    pub fn node_for_tab(&self, tab_id: TabId) -> Option<&Node> {
        self.node_id_for_tab(tab_id).and_then(|id| self.nodes.get(&id))
    }

    pub fn contains_tab(&self, tab_id: TabId) -> bool {
        self.tab_to_node.contains_key(&tab_id)
    }

    /// Every tracked tab id, ascending.
    pub fn tab_ids(&self) -> impl Iterator<Item = TabId> + '_ {
        self.tab_to_node.keys().copied()
    }

    /// Children of a node in display order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Position of a node among its siblings (or among its view's roots, or
    /// within the pinned list).
    pub fn child_order(&self, id: NodeId) -> Option<usize> {
        self.sibling_list(id)?.iter().position(|n| *n == id)
    }

    pub fn window(&self, id: WindowId) -> Option<&WindowState> {
        self.windows.get(&id)
    }

    pub fn windows(&self) -> impl Iterator<Item = &WindowState> {
        self.windows.values()
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        self.windows.keys().copied().collect()
    }

    pub fn unread(&self) -> &UnreadTracker {
        &self.unread
    }

    pub fn is_unread(&self, tab_id: TabId) -> bool {
        self.node_id_for_tab(tab_id)
            .is_some_and(|id| self.unread.contains(id))
    }

    /// Tab ids of unread nodes, ascending.
    pub fn unread_tab_ids(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = self
            .unread
            .iter()
            .filter_map(|id| self.nodes.get(&id).map(|n| n.tab_id))
            .collect();
        tabs.sort();
        tabs
    }

    /// Whether `ancestor` is a proper ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.nodes.get(&id).and_then(|n| n.parent_id);
        let mut steps = 0;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = self.nodes.get(&parent).and_then(|n| n.parent_id);
        }
        false
    }

    /// The topmost ancestor of a node (the node itself when it is a root).
    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut current = id;
        let mut steps = 0;
        while let Some(parent) = self.nodes.get(&current).and_then(|n| n.parent_id) {
            current = parent;
            steps += 1;
            if steps > self.nodes.len() {
                break;
            }
        }
        current
    }

    /// Pre-order traversal of a subtree, starting with `id` itself.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Pre-order traversal of one view's forest.
    pub fn view_pre_order(&self, window_id: WindowId, view_id: &ViewId) -> Vec<NodeId> {
        self.windows
            .get(&window_id)
            .and_then(|w| w.view(view_id))
            .map(|view| {
                view.roots
                    .iter()
                    .flat_map(|root| self.subtree(*root))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Run every invariant check against the current state.
    pub fn check_invariants(&self) -> Vec<String> {
        invariants::check(self)
    }

    // ── Transactions ────────────────────────────────────────────────────

    /// Run `op` atomically: on error or invariant violation the store is
    /// restored to its state before the call.
    pub(crate) fn transact<T>(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let before = self.clone();
        let result = op(self).and_then(|value| {
            let violations = invariants::check(self);
            if violations.is_empty() {
                Ok(value)
            } else {
                Err(TreeError::InvariantViolation {
                    operation,
                    violations,
                })
            }
        });

        match result {
            Ok(value) => {
                self.revision = before.revision + 1;
                Ok(value)
            }
            Err(e) => {
                debug!(operation, error = %e, "Tree operation rolled back");
                *self = before;
                Err(e)
            }
        }
    }

    // ── Internal helpers (no invariant checks) ──────────────────────────

    pub(crate) fn alloc_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id.max(1));
        self.next_node_id = id.0 + 1;
        id
    }

    pub(crate) fn require_tab(&self, tab_id: TabId) -> Result<NodeId> {
        self.node_id_for_tab(tab_id)
            .ok_or(TreeError::UnknownTab(tab_id))
    }

    pub(crate) fn require_node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(TreeError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))
    }

    pub(crate) fn window_mut(&mut self, id: WindowId) -> Result<&mut WindowState> {
        self.windows.get_mut(&id).ok_or(TreeError::UnknownWindow(id))
    }

    /// The list a node currently lives in: parent's children, view roots, or pinned list.
    pub(crate) fn sibling_list(&self, id: NodeId) -> Option<&Vec<NodeId>> {
        let node = self.nodes.get(&id)?;
        if let Some(parent) = node.parent_id {
            return self.children.get(&parent);
        }
        let window = self.windows.get(&node.window_id)?;
        if node.pinned {
            Some(&window.pinned)
        } else {
            window.view(&node.view_id).map(|v| &v.roots)
        }
    }

    fn sibling_list_mut(&mut self, id: NodeId) -> Result<&mut Vec<NodeId>> {
        let node = self.require_node(id)?;
        let (parent, window_id, view_id, pinned) =
            (node.parent_id, node.window_id, node.view_id.clone(), node.pinned);
        if let Some(parent) = parent {
            return Ok(self.children.entry(parent).or_default());
        }
        let window = self.window_mut(window_id)?;
        if pinned {
            return Ok(&mut window.pinned);
        }
        window
            .view_mut(&view_id)
            .map(|v| &mut v.roots)
            .ok_or(TreeError::UnknownView {
                window: window_id,
                view: view_id,
            })
    }

    /// Remove a node from the list it lives in. Returns its former index.
    pub(crate) fn detach(&mut self, id: NodeId) -> Result<usize> {
        let list = self.sibling_list_mut(id)?;
        let index = list
            .iter()
            .position(|n| *n == id)
            .ok_or(TreeError::UnknownNode(id))?;
        list.remove(index);
        Ok(index)
    }

    /// Insert a detached node into `list_owner`'s list at `index` (clamped).
    /// The node's `parent_id`, `view_id`, and `pinned` must already describe
    /// the destination.
    pub(crate) fn attach_at(&mut self, id: NodeId, index: Option<usize>) -> Result<()> {
        let list = self.sibling_list_mut(id)?;
        let index = index.map_or(list.len(), |i| i.min(list.len()));
        list.insert(index, id);
        Ok(())
    }

    /// Splice a node's children into its own slot, giving them its parent.
    /// The node is left detached with no children.
    pub(crate) fn promote_children(&mut self, id: NodeId) -> Result<usize> {
        let (parent, view_id) = {
            let node = self.require_node(id)?;
            (node.parent_id, node.view_id.clone())
        };
        let promoted = self.children.remove(&id).unwrap_or_default();
        for child in &promoted {
            let child = self.node_mut(*child)?;
            child.parent_id = parent;
            child.view_id = view_id.clone();
        }
        let slot = self.detach(id)?;
        let list = self.sibling_list_mut(id)?;
        let slot = slot.min(list.len());
        list.splice(slot..slot, promoted.iter().copied());
        for child in promoted {
            self.refresh_subtree(child)?;
        }
        Ok(slot)
    }

    /// Recompute depth and view for a subtree from its root's parent.
    pub(crate) fn refresh_subtree(&mut self, id: NodeId) -> Result<()> {
        let (depth, view_id) = match self.require_node(id)?.parent_id {
            Some(parent) => {
                let parent = self.require_node(parent)?;
                (parent.depth + 1, parent.view_id.clone())
            }
            None => (0, self.require_node(id)?.view_id.clone()),
        };

        let mut stack = vec![(id, depth)];
        while let Some((next, depth)) = stack.pop() {
            let node = self.node_mut(next)?;
            node.depth = depth;
            node.view_id = view_id.clone();
            stack.extend(self.children(next).iter().map(|c| (*c, depth + 1)));
        }
        Ok(())
    }

    /// Remove a detached, childless node from every index.
    pub(crate) fn forget(&mut self, id: NodeId) -> Result<Node> {
        let node = self.nodes.remove(&id).ok_or(TreeError::UnknownNode(id))?;
        self.tab_to_node.remove(&node.tab_id);
        self.children.remove(&id);
        self.unread.clear(id);
        if let Some(window) = self.windows.get_mut(&node.window_id)
            && window.active_tab == Some(node.tab_id)
        {
            window.active_tab = None;
        }
        Ok(node)
    }

    pub(crate) fn ensure_window_state(&mut self, id: WindowId) -> &mut WindowState {
        self.windows
            .entry(id)
            .or_insert_with(|| WindowState::new(id))
    }
}
