//! Drag-and-drop controller with hover auto-expand.
//!
//! Hovering a collapsed node that has children arms a one-shot timer; when it
//! fires the node expands. Hovering elsewhere, dropping, or cancelling disarms
//! it first, so a cancel processed before the timer always wins.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tabtree_core::{InsertPosition, Relation, TreeError, TreeStore};
use tabtree_types::{NodeId, TabId};
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;

/// Where a dragged node lands relative to the hovered target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPosition {
    Before,
    After,
    Child,
}

/// The mutation a drop resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropAction {
    Reorder {
        tab: TabId,
        target: TabId,
        relation: Relation,
    },
    Reparent {
        tab: TabId,
        parent: Option<TabId>,
        position: InsertPosition,
    },
    MovePinned {
        tab: TabId,
        target: TabId,
        relation: Relation,
    },
}

impl DropAction {
    pub fn apply(self, store: &mut TreeStore) -> tabtree_core::Result<()> {
        match self {
            DropAction::Reorder {
                tab,
                target,
                relation,
            } => store.reorder_siblings(tab, target, relation),
            DropAction::Reparent {
                tab,
                parent,
                position,
            } => store.reparent(tab, parent, position),
            DropAction::MovePinned {
                tab,
                target,
                relation,
            } => store.move_pinned(tab, target, relation),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Hover {
    target: NodeId,
    deadline: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct DragController {
    delay: Duration,
    auto_expand: bool,
    dragging: Option<NodeId>,
    hover: Option<Hover>,
}

impl DragController {
    pub fn new(delay: Duration, auto_expand: bool) -> Self {
        Self {
            delay,
            auto_expand,
            dragging: None,
            hover: None,
        }
    }

    pub fn dragging(&self) -> Option<NodeId> {
        self.dragging
    }

    pub fn hovered(&self) -> Option<NodeId> {
        self.hover.map(|h| h.target)
    }

    /// When the armed auto-expand timer fires, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.hover.and_then(|h| h.deadline)
    }

    pub fn start_drag(&mut self, store: &TreeStore, node: NodeId) -> Result<()> {
        store.node(node).ok_or(TreeError::UnknownNode(node))?;
        self.dragging = Some(node);
        self.hover = None;
        debug!(node_id = %node, "Drag started");
        Ok(())
    }

    /// Hover over `target`. Re-hovering the current target keeps its timer.
    pub fn hover(&mut self, store: &TreeStore, target: NodeId, now: Instant) -> Result<()> {
        let dragging = self.require_drag()?;
        let node = store.node(target).ok_or(TreeError::UnknownNode(target))?;
        if self.hovered() == Some(target) {
            return Ok(());
        }

        let armed = self.auto_expand
            && target != dragging
            && !node.expanded
            && !store.children(target).is_empty();
        self.hover = Some(Hover {
            target,
            deadline: armed.then(|| now + self.delay),
        });
        if armed {
            debug!(node_id = %target, "Auto-expand armed");
        }
        Ok(())
    }

    /// Fire the auto-expand timer if it is due. Returns the expanded tab.
    pub fn fire(&mut self, store: &mut TreeStore, now: Instant) -> Result<Option<TabId>> {
        let Some(hover) = self.hover.as_mut() else {
            return Ok(None);
        };
        if hover.deadline.is_none_or(|d| d > now) {
            return Ok(None);
        }
        hover.deadline = None;

        let Some(tab) = store.node(hover.target).map(|n| n.tab_id) else {
            return Ok(None);
        };
        let changed = store.set_expanded(tab, true)?;
        debug!(tab_id = %tab, "Auto-expanded hovered node");
        Ok(changed.then_some(tab))
    }

    /// Abandon the drag and disarm any timer.
    pub fn cancel(&mut self) {
        self.dragging = None;
        self.hover = None;
    }

    /// Drop the dragged node relative to the hovered target.
    ///
    /// The drag ends whether or not the drop resolves to a valid mutation.
    pub fn drop_on(&mut self, store: &TreeStore, position: DropPosition) -> Result<DropAction> {
        let dragging = self.require_drag()?;
        let hovered = self.hovered();
        self.cancel();

        let target = hovered.ok_or_else(|| TreeError::InvalidTarget("no drop target".into()))?;
        let node = store.node(dragging).ok_or(TreeError::UnknownNode(dragging))?;
        let target_node = store.node(target).ok_or(TreeError::UnknownNode(target))?;
        if dragging == target {
            return Err(TreeError::InvalidTarget("cannot drop a tab onto itself".into()).into());
        }

        let relation = match position {
            DropPosition::Before => Relation::Before,
            DropPosition::After => Relation::After,
            DropPosition::Child => {
                if target_node.pinned {
                    return Err(TreeError::PinnedTab(target_node.tab_id).into());
                }
                return Ok(DropAction::Reparent {
                    tab: node.tab_id,
                    parent: Some(target_node.tab_id),
                    position: InsertPosition::FirstChild,
                });
            }
        };

        match (node.pinned, target_node.pinned) {
            (true, true) => Ok(DropAction::MovePinned {
                tab: node.tab_id,
                target: target_node.tab_id,
                relation,
            }),
            (true, false) => Err(TreeError::PinnedTab(node.tab_id).into()),
            (false, true) => Err(TreeError::PinnedTab(target_node.tab_id).into()),
            (false, false) => {
                let siblings = node.parent_id == target_node.parent_id
                    && node.window_id == target_node.window_id
                    && node.view_id == target_node.view_id;
                if siblings {
                    return Ok(DropAction::Reorder {
                        tab: node.tab_id,
                        target: target_node.tab_id,
                        relation,
                    });
                }
                let parent = target_node
                    .parent_id
                    .and_then(|p| store.node(p))
                    .map(|p| p.tab_id);
                let position = match relation {
                    Relation::Before => InsertPosition::Before(target_node.tab_id),
                    Relation::After => InsertPosition::After(target_node.tab_id),
                };
                Ok(DropAction::Reparent {
                    tab: node.tab_id,
                    parent,
                    position,
                })
            }
        }
    }

    fn require_drag(&self) -> Result<NodeId> {
        self.dragging
            .ok_or_else(|| TreeError::InvalidTarget("no drag in progress".into()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabtree_core::Placement;
    use tabtree_types::{NativeTab, WindowId};

    const DELAY: Duration = Duration::from_millis(1000);

    fn tab(id: i64) -> NativeTab {
        NativeTab::new(TabId(id), WindowId(1), 0)
    }

    /// P(1) with child C(2), then D(3) and E(4) as roots. P collapsed.
    fn tree() -> TreeStore {
        let mut store = TreeStore::new();
        store.create_node(&tab(1), Placement::End).unwrap();
        store.create_node(&tab(2), Placement::Child(TabId(1))).unwrap();
        store.create_node(&tab(3), Placement::End).unwrap();
        store.create_node(&tab(4), Placement::End).unwrap();
        store.set_expanded(TabId(1), false).unwrap();
        store
    }

    fn node(store: &TreeStore, tab: i64) -> NodeId {
        store.node_id_for_tab(TabId(tab)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_hover_expands_after_delay() {
        let mut store = tree();
        let mut drag = DragController::new(DELAY, true);
        drag.start_drag(&store, node(&store, 3)).unwrap();
        drag.hover(&store, node(&store, 1), Instant::now()).unwrap();
        assert!(drag.deadline().is_some());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(drag.fire(&mut store, Instant::now()).unwrap(), None);

        // Re-hovering the same node does not restart the timer.
        drag.hover(&store, node(&store, 1), Instant::now()).unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(drag.fire(&mut store, Instant::now()).unwrap(), Some(TabId(1)));
        assert!(store.node_for_tab(TabId(1)).unwrap().expanded);
        assert!(drag.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hover_elsewhere_cancels() {
        let mut store = tree();
        let mut drag = DragController::new(DELAY, true);
        drag.start_drag(&store, node(&store, 3)).unwrap();
        drag.hover(&store, node(&store, 1), Instant::now()).unwrap();
        tokio::time::advance(Duration::from_millis(600)).await;
        drag.hover(&store, node(&store, 4), Instant::now()).unwrap();
        assert!(drag.deadline().is_none());

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(drag.fire(&mut store, Instant::now()).unwrap(), None);
        assert!(!store.node_for_tab(TabId(1)).unwrap().expanded);
    }

    #[test]
    fn test_no_timer_for_leaf_expanded_or_disabled() {
        let store = tree();
        let now = Instant::now();
        let mut drag = DragController::new(DELAY, true);
        drag.start_drag(&store, node(&store, 3)).unwrap();
        drag.hover(&store, node(&store, 4), now).unwrap();
        assert!(drag.deadline().is_none());

        let mut disabled = DragController::new(DELAY, false);
        disabled.start_drag(&store, node(&store, 3)).unwrap();
        disabled.hover(&store, node(&store, 1), now).unwrap();
        assert!(disabled.deadline().is_none());
    }

    #[test]
    fn test_drop_resolution() {
        let store = tree();
        let now = Instant::now();
        let mut drag = DragController::new(DELAY, true);

        drag.start_drag(&store, node(&store, 3)).unwrap();
        drag.hover(&store, node(&store, 1), now).unwrap();
        assert_eq!(
            drag.drop_on(&store, DropPosition::Child).unwrap(),
            DropAction::Reparent {
                tab: TabId(3),
                parent: Some(TabId(1)),
                position: InsertPosition::FirstChild,
            }
        );
        assert!(drag.dragging().is_none());

        drag.start_drag(&store, node(&store, 4)).unwrap();
        drag.hover(&store, node(&store, 3), now).unwrap();
        assert_eq!(
            drag.drop_on(&store, DropPosition::Before).unwrap(),
            DropAction::Reorder {
                tab: TabId(4),
                target: TabId(3),
                relation: Relation::Before,
            }
        );

        drag.start_drag(&store, node(&store, 4)).unwrap();
        drag.hover(&store, node(&store, 2), now).unwrap();
        assert_eq!(
            drag.drop_on(&store, DropPosition::After).unwrap(),
            DropAction::Reparent {
                tab: TabId(4),
                parent: Some(TabId(1)),
                position: InsertPosition::After(TabId(2)),
            }
        );
    }

    #[test]
    fn test_drop_without_drag_or_target_fails() {
        let store = tree();
        let mut drag = DragController::new(DELAY, true);
        assert!(drag.drop_on(&store, DropPosition::Child).is_err());

        drag.start_drag(&store, node(&store, 3)).unwrap();
        assert!(drag.drop_on(&store, DropPosition::Child).is_err());
        assert!(drag.dragging().is_none());
    }

    #[test]
    fn test_drop_applies() {
        let mut store = tree();
        let action = DropAction::Reparent {
            tab: TabId(4),
            parent: Some(TabId(1)),
            position: InsertPosition::FirstChild,
        };
        action.apply(&mut store).unwrap();
        assert_eq!(store.native_order(WindowId(1)), vec![TabId(1), TabId(4), TabId(2), TabId(3)]);
    }
}
