//! Native order reconciler.
//!
//! Flattens each window's tree into the native index order it implies and
//! issues the moves needed to bring the browser's tab strip in line. The tree
//! is authoritative: a native reorder the engine did not request is undone
//! on the next pass. Pinned tabs are the exception; their order is adopted
//! from the browser (see [`Reconciler::adopt_pinned_order`]).
//!
//! Every move the engine issues is recorded so the browser's echo of it can
//! be recognized and dropped instead of triggering another pass.

use std::collections::{BTreeMap, HashMap, HashSet};

use tabtree_core::{Placement, TreeStore};
use tabtree_types::{NativeApi, NativeTab, NodeId, TabId, WindowId};
use tracing::{debug, trace, warn};

use crate::error::Result;

/// One native move: put `tab_id` at `index` of its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedMove {
    pub tab_id: TabId,
    pub index: usize,
}

/// Compute the moves that turn `current` into `target`.
///
/// Tabs in `target` that `current` does not contain are ignored, and tabs in
/// `current` that `target` does not mention stay where they are. The tabs on
/// a longest run already in target order are left in place; each remaining
/// tab is moved, in target order, to just after its target predecessor. The
/// returned indices assume the moves are applied one after another.
pub fn plan_moves(target: &[TabId], current: &[TabId]) -> Vec<PlannedMove> {
    let position: HashMap<TabId, usize> = current
        .iter()
        .enumerate()
        .map(|(i, tab)| (*tab, i))
        .collect();
    let mut seen = HashSet::new();
    let target: Vec<TabId> = target
        .iter()
        .copied()
        .filter(|tab| position.contains_key(tab) && seen.insert(*tab))
        .collect();

    let ranks: Vec<usize> = target.iter().map(|tab| position[tab]).collect();
    let keep: HashSet<TabId> = longest_increasing(&ranks)
        .into_iter()
        .map(|i| target[i])
        .collect();

    let mut order = current.to_vec();
    let mut moves = Vec::new();
    for (i, tab) in target.iter().enumerate() {
        if keep.contains(tab) {
            continue;
        }
        let Some(from) = order.iter().position(|t| t == tab) else {
            continue;
        };
        order.remove(from);
        let to = match i.checked_sub(1).map(|p| target[p]) {
            Some(pred) => order
                .iter()
                .position(|t| *t == pred)
                .map_or(order.len(), |p| p + 1),
            None => order
                .iter()
                .position(|t| seen.contains(t))
                .unwrap_or(order.len()),
        };
        order.insert(to, *tab);
        if to != from {
            moves.push(PlannedMove {
                tab_id: *tab,
                index: to,
            });
        }
    }
    moves
}

/// Indices into `seq` of one longest strictly increasing subsequence.
fn longest_increasing(seq: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, value) in seq.iter().enumerate() {
        let slot = tails.partition_point(|&t| seq[t] < *value);
        if slot > 0 {
            prev[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        run.push(i);
        cursor = prev[i];
    }
    run.reverse();
    run
}

/// Live tabs grouped by window, each in native index order.
fn by_window(tabs: Vec<NativeTab>) -> BTreeMap<WindowId, Vec<NativeTab>> {
    let mut grouped: BTreeMap<WindowId, Vec<NativeTab>> = BTreeMap::new();
    for tab in tabs {
        grouped.entry(tab.window_id).or_default().push(tab);
    }
    for tabs in grouped.values_mut() {
        tabs.sort_by_key(|t| t.index);
    }
    grouped
}

/// Issues native moves and remembers them until their echoes arrive.
#[derive(Debug, Default)]
pub struct Reconciler {
    pending: HashMap<TabId, Vec<(WindowId, usize)>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of issued moves whose echo has not been seen yet.
    pub fn pending(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Consume the record of an engine-issued move matching a native
    /// tab-moved event. Returns `true` when the event is an echo.
    ///
    /// A move to the exact recorded slot matches first. Failing that, any
    /// outstanding move of the tab in the same window matches, since the
    /// browser may clamp the index (pinned region boundaries).
    pub fn take_echo(&mut self, tab_id: TabId, window_id: WindowId, to_index: usize) -> bool {
        let Some(moves) = self.pending.get_mut(&tab_id) else {
            return false;
        };
        let hit = moves
            .iter()
            .position(|m| *m == (window_id, to_index))
            .or_else(|| moves.iter().position(|(w, _)| *w == window_id));
        let Some(hit) = hit else {
            return false;
        };
        moves.remove(hit);
        if moves.is_empty() {
            self.pending.remove(&tab_id);
        }
        true
    }

    /// Drop move records of a tab that no longer exists.
    pub fn forget(&mut self, tab_id: TabId) {
        self.pending.remove(&tab_id);
    }

    /// Drop move records into a window that has closed.
    pub fn forget_window(&mut self, window_id: WindowId) {
        self.pending.retain(|_, moves| {
            moves.retain(|(w, _)| *w != window_id);
            !moves.is_empty()
        });
    }

    /// Bring every window's native order in line with the tree.
    ///
    /// Nodes whose tabs are gone are pruned first. Live tabs the tree does
    /// not track (their creation is still queued, or they are excluded) and
    /// tabs whose pinned flag disagrees with the tree (the update is still
    /// queued) are left where they are. Returns the number of moves issued.
    pub async fn reconcile(&mut self, store: &mut TreeStore, native: &dyn NativeApi) -> Result<usize> {
        let live = native.query_tabs(None).await?;
        let live_ids: HashSet<TabId> = live.iter().map(|t| t.id).collect();
        let pruned = store.retain_tabs(|tab| live_ids.contains(&tab))?;
        for tab in &pruned {
            debug!(tab_id = %tab, "Pruned node of closed tab");
            self.forget(*tab);
        }

        let grouped = by_window(live);
        let mut issued = 0;
        for window_id in store.window_ids() {
            let Some(tabs) = grouped.get(&window_id) else {
                continue;
            };
            let current: Vec<TabId> = tabs.iter().map(|t| t.id).collect();
            let mismatched: HashSet<TabId> = tabs
                .iter()
                .filter(|t| store.node_for_tab(t.id).is_some_and(|n| n.pinned != t.pinned))
                .map(|t| t.id)
                .collect();
            let target: Vec<TabId> = store
                .native_order(window_id)
                .into_iter()
                .filter(|tab| !mismatched.contains(tab))
                .collect();

            for planned in plan_moves(&target, &current) {
                match native.move_tab(planned.tab_id, window_id, planned.index).await {
                    Ok(()) => {
                        trace!(
                            tab_id = %planned.tab_id,
                            window_id = %window_id,
                            index = planned.index,
                            "Moved tab"
                        );
                        self.pending
                            .entry(planned.tab_id)
                            .or_default()
                            .push((window_id, planned.index));
                        issued += 1;
                    }
                    Err(e) if e.is_missing() => {
                        debug!(tab_id = %planned.tab_id, error = %e, "Tab vanished before move");
                    }
                    Err(e) => {
                        warn!(tab_id = %planned.tab_id, error = %e, "Native move failed");
                    }
                }
            }
        }

        if issued > 0 {
            debug!(moves = issued, "Reconciled native order");
        }
        Ok(issued)
    }

    /// Take the browser's order of a window's pinned tabs as the new pinned list.
    /// Returns whether the list changed.
    pub async fn adopt_pinned_order(
        &self,
        store: &mut TreeStore,
        native: &dyn NativeApi,
        window_id: WindowId,
    ) -> Result<bool> {
        let mut tabs = native.query_tabs(Some(window_id)).await?;
        tabs.sort_by_key(|t| t.index);
        let order: Vec<TabId> = tabs.iter().filter(|t| t.pinned).map(|t| t.id).collect();
        Ok(store.sync_pinned_order(window_id, &order)?)
    }

    /// Move a tab's node into the window it was attached to natively.
    ///
    /// The new node becomes a root right after the root-level ancestor of the
    /// tab natively preceding it, or the first root when nothing precedes it.
    /// Returns `None` when the tab is already gone.
    pub async fn adopt_attached(
        &self,
        store: &mut TreeStore,
        native: &dyn NativeApi,
        tab_id: TabId,
        window_id: WindowId,
    ) -> Result<Option<NodeId>> {
        let mut tabs = match native.query_tabs(Some(window_id)).await {
            Ok(tabs) => tabs,
            Err(e) if e.is_missing() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        tabs.sort_by_key(|t| t.index);
        let Some(pos) = tabs.iter().position(|t| t.id == tab_id) else {
            return Ok(None);
        };

        let previous = tabs[..pos]
            .iter()
            .rev()
            .find(|t| !t.pinned && store.node_for_tab(t.id).is_some_and(|n| n.window_id == window_id))
            .map(|t| t.id);
        let id = store.attach_to_window(&tabs[pos], Placement::RootAfter(previous))?;
        debug!(tab_id = %tab_id, window_id = %window_id, "Tab attached to window");
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[i64]) -> Vec<TabId> {
        raw.iter().map(|i| TabId(*i)).collect()
    }

    fn apply(current: &[TabId], moves: &[PlannedMove]) -> Vec<TabId> {
        let mut order = current.to_vec();
        for m in moves {
            let from = order.iter().position(|t| *t == m.tab_id).unwrap();
            let tab = order.remove(from);
            order.insert(m.index, tab);
        }
        order
    }

    #[test]
    fn test_in_order_needs_no_moves() {
        let order = ids(&[1, 2, 3]);
        assert!(plan_moves(&order, &order).is_empty());
    }

    #[test]
    fn test_single_displaced_tab_moves_once() {
        let target = ids(&[1, 2, 3, 4, 5]);
        let current = ids(&[1, 5, 2, 3, 4]);
        let moves = plan_moves(&target, &current);
        assert_eq!(moves, vec![PlannedMove { tab_id: TabId(5), index: 4 }]);
        assert_eq!(apply(&current, &moves), target);
    }

    #[test]
    fn test_reversal() {
        let target = ids(&[4, 3, 2, 1]);
        let current = ids(&[1, 2, 3, 4]);
        let moves = plan_moves(&target, &current);
        assert_eq!(moves.len(), 3);
        assert_eq!(apply(&current, &moves), target);
    }

    #[test]
    fn test_unmanaged_tabs_stay_put() {
        let target = ids(&[2, 1]);
        let current = ids(&[1, 9, 2]);
        let moves = plan_moves(&target, &current);
        let result = apply(&current, &moves);
        let managed: Vec<TabId> = result.iter().copied().filter(|t| *t != TabId(9)).collect();
        assert_eq!(managed, target);
        assert_eq!(moves.len(), 1);
    }

    #[test]
    fn test_target_tabs_missing_natively_are_ignored() {
        let target = ids(&[1, 7, 2]);
        let current = ids(&[2, 1]);
        let moves = plan_moves(&target, &current);
        assert_eq!(apply(&current, &moves), ids(&[1, 2]));
    }

    #[test]
    fn test_longest_increasing() {
        assert_eq!(longest_increasing(&[3, 0, 1, 4, 2]), vec![1, 2, 4]);
        assert!(longest_increasing(&[]).is_empty());
    }

    #[test]
    fn test_echo_matching() {
        let mut reconciler = Reconciler::new();
        reconciler
            .pending
            .entry(TabId(1))
            .or_default()
            .extend([(WindowId(1), 3), (WindowId(1), 5)]);

        assert!(!reconciler.take_echo(TabId(2), WindowId(1), 3));
        assert!(!reconciler.take_echo(TabId(1), WindowId(2), 3));
        assert!(reconciler.take_echo(TabId(1), WindowId(1), 5));
        // A clamped echo still matches the outstanding move.
        assert!(reconciler.take_echo(TabId(1), WindowId(1), 1));
        assert_eq!(reconciler.pending(), 0);
        assert!(!reconciler.take_echo(TabId(1), WindowId(1), 3));
    }

    #[test]
    fn test_closed_window_moves_forgotten() {
        let mut reconciler = Reconciler::new();
        reconciler.pending.insert(TabId(1), vec![(WindowId(1), 0), (WindowId(1), 2)]);
        reconciler.pending.insert(TabId(2), vec![(WindowId(2), 1)]);

        reconciler.forget_window(WindowId(1));
        assert_eq!(reconciler.pending(), 1);
        assert!(!reconciler.pending.contains_key(&TabId(1)));
        assert!(reconciler.take_echo(TabId(2), WindowId(2), 1));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn plan_converges(perm in Just((1..12i64).collect::<Vec<_>>()).prop_shuffle()) {
                let current = ids(&(1..12).collect::<Vec<_>>());
                let target = ids(&perm);
                let moves = plan_moves(&target, &current);
                prop_assert_eq!(apply(&current, &moves), target.clone());

                let kept = longest_increasing(
                    &target.iter().map(|t| current.iter().position(|c| c == t).unwrap()).collect::<Vec<_>>(),
                ).len();
                prop_assert!(moves.len() <= target.len() - kept);
            }
        }
    }
}
