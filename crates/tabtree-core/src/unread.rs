//! Unread tracking for tabs opened in the background.

use std::collections::BTreeSet;

use tabtree_types::NodeId;

/// Set of nodes whose tab was created in the background and has not been
/// activated since.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadTracker {
    nodes: BTreeSet<NodeId>,
}

impl UnreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a node unread. Returns `true` if it was not already unread.
    pub fn mark(&mut self, node: NodeId) -> bool {
        self.nodes.insert(node)
    }

    /// Clear a node's unread flag. Returns `true` if it was unread.
    pub fn clear(&mut self, node: NodeId) -> bool {
        self.nodes.remove(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    /// Drop every node for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(NodeId) -> bool) {
        self.nodes.retain(|n| keep(*n));
    }
}
