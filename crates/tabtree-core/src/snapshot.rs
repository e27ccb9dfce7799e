//! Versioned snapshot schema persisted under the `tree_state` key.
//!
//! Loading is lenient: entries that cannot be placed (duplicate ids, dangling
//! parents, cycles, unknown views) are dropped or re-rooted with a warning
//! instead of failing the whole snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabtree_types::{NodeId, TabId, ViewId, WindowId};

use crate::invariants;
use crate::node::{Node, View, WindowState};
use crate::store::TreeStore;

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub next_node_id: u64,
    #[serde(default)]
    pub windows: Vec<WindowSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    pub window_id: WindowId,
    #[serde(default)]
    pub tab_to_node: BTreeMap<TabId, NodeId>,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub pinned_order: Vec<NodeId>,
    #[serde(default)]
    pub active_view: Option<ViewId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: NodeId,
    pub tab_id: TabId,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub child_order: usize,
    #[serde(default = "default_expanded")]
    pub expanded: bool,
    #[serde(default)]
    pub pinned: bool,
    pub view_id: ViewId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub discarded: bool,
}

fn default_expanded() -> bool {
    true
}

impl TreeSnapshot {
    pub fn node_count(&self) -> usize {
        self.windows.iter().map(|w| w.nodes.len()).sum()
    }
}

impl TreeStore {
    /// Capture the current tree.
    pub fn snapshot(&self) -> TreeSnapshot {
        let windows = self
            .windows()
            .map(|window| {
                let nodes: Vec<NodeRecord> = self
                    .nodes()
                    .filter(|n| n.window_id == window.id)
                    .map(|n| NodeRecord {
                        id: n.id,
                        tab_id: n.tab_id,
                        parent_id: n.parent_id,
                        depth: n.depth,
                        child_order: self.child_order(n.id).unwrap_or(0),
                        expanded: n.expanded,
                        pinned: n.pinned,
                        view_id: n.view_id.clone(),
                        url: n.url.clone(),
                        title: n.title.clone(),
                        discarded: n.discarded,
                    })
                    .collect();
                WindowSnapshot {
                    window_id: window.id,
                    tab_to_node: nodes.iter().map(|r| (r.tab_id, r.id)).collect(),
                    nodes,
                    views: window.views.clone(),
                    pinned_order: window.pinned.clone(),
                    active_view: Some(window.active_view.clone()),
                }
            })
            .collect();

        TreeSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            next_node_id: self.next_node_id,
            windows,
        }
    }

    /// Rebuild a store from a snapshot. Returns the store and a warning for
    /// every entry that had to be dropped or repaired.
    pub fn from_snapshot(snapshot: &TreeSnapshot) -> (TreeStore, Vec<String>) {
        let mut warnings = Vec::new();
        if snapshot.version > SNAPSHOT_VERSION {
            warnings.push(format!(
                "snapshot version {} is newer than supported version {SNAPSHOT_VERSION}; ignoring it",
                snapshot.version
            ));
            return (TreeStore::new(), warnings);
        }

        let mut store = TreeStore::new();
        for window in &snapshot.windows {
            if store.windows.contains_key(&window.window_id) {
                warnings.push(format!("duplicate state for window {}; dropped", window.window_id));
                continue;
            }
            load_window(&mut store, window, &mut warnings);
        }

        let highest = store.nodes.keys().next_back().map_or(0, |id| id.0);
        store.next_node_id = snapshot.next_node_id.max(highest + 1);

        let violations = invariants::check(&store);
        if !violations.is_empty() {
            warnings.extend(violations);
            warnings.push("snapshot could not be repaired; starting from an empty tree".to_string());
            return (TreeStore::new(), warnings);
        }
        (store, warnings)
    }
}

fn load_window(store: &mut TreeStore, snapshot: &WindowSnapshot, warnings: &mut Vec<String>) {
    let window_id = snapshot.window_id;
    let mut state = WindowState::new(window_id);

    let mut views: Vec<View> = Vec::new();
    for view in &snapshot.views {
        if views.iter().any(|v| v.id == view.id) {
            warnings.push(format!("window {window_id}: duplicate view '{}' dropped", view.id));
            continue;
        }
        views.push(View {
            roots: Vec::new(),
            ..view.clone()
        });
    }
    if !views.is_empty() {
        state.views = views;
    }
    state.active_view = snapshot
        .active_view
        .clone()
        .filter(|v| state.has_view(v))
        .unwrap_or_else(|| state.first_view_id());

    // Accept records with unique node and tab ids.
    let mut records: BTreeMap<NodeId, &NodeRecord> = BTreeMap::new();
    let mut tabs: HashSet<TabId> = HashSet::new();
    for record in &snapshot.nodes {
        if store.nodes.contains_key(&record.id) || records.contains_key(&record.id) {
            warnings.push(format!("window {window_id}: duplicate node {} dropped", record.id));
            continue;
        }
        if store.tab_to_node.contains_key(&record.tab_id) || !tabs.insert(record.tab_id) {
            warnings.push(format!("window {window_id}: duplicate tab {} dropped", record.tab_id));
            continue;
        }
        if let Some(mapped) = snapshot.tab_to_node.get(&record.tab_id)
            && *mapped != record.id
        {
            warnings.push(format!(
                "window {window_id}: tab {} mapped to {mapped} but wrapped by {}; keeping {}",
                record.tab_id, record.id, record.id
            ));
        }
        records.insert(record.id, record);
    }
    for (tab, id) in &snapshot.tab_to_node {
        if !records.contains_key(id) {
            warnings.push(format!("window {window_id}: mapping of tab {tab} to unknown node {id} dropped"));
        }
    }

    // Parent links that can be honored.
    let mut parent_of: BTreeMap<NodeId, Option<NodeId>> = BTreeMap::new();
    for record in records.values() {
        let parent = record
            .parent_id
            .filter(|p| !record.pinned && records.get(p).is_some_and(|r| !r.pinned));
        if record.parent_id.is_some() && parent.is_none() {
            warnings.push(format!(
                "window {window_id}: node {} has an unusable parent; promoted to root",
                record.id
            ));
        }
        parent_of.insert(record.id, parent);
    }

    // Break cycles at the first member of each.
    let ids: Vec<NodeId> = parent_of.keys().copied().collect();
    for id in ids {
        let mut seen = HashSet::new();
        let mut current = parent_of.get(&id).copied().flatten();
        while let Some(parent) = current {
            if parent == id {
                warnings.push(format!("window {window_id}: node {id} is in a cycle; promoted to root"));
                parent_of.insert(id, None);
                break;
            }
            if !seen.insert(parent) {
                break;
            }
            current = parent_of.get(&parent).copied().flatten();
        }
    }

    for record in records.values() {
        let view_id = if state.has_view(&record.view_id) {
            record.view_id.clone()
        } else {
            warnings.push(format!(
                "window {window_id}: node {} references unknown view '{}'",
                record.id, record.view_id
            ));
            state.first_view_id()
        };
        store.nodes.insert(
            record.id,
            Node {
                id: record.id,
                tab_id: record.tab_id,
                window_id,
                parent_id: parent_of.get(&record.id).copied().flatten(),
                depth: 0,
                expanded: record.expanded,
                pinned: record.pinned,
                view_id,
                url: record.url.clone(),
                title: record.title.clone(),
                discarded: record.discarded,
            },
        );
        store.tab_to_node.insert(record.tab_id, record.id);
    }

    // Children in recorded sibling order.
    let mut children: HashMap<NodeId, Vec<(usize, NodeId)>> = HashMap::new();
    for record in records.values() {
        if let Some(parent) = parent_of.get(&record.id).copied().flatten() {
            children
                .entry(parent)
                .or_default()
                .push((record.child_order, record.id));
        }
    }
    for (parent, mut list) in children {
        list.sort();
        store
            .children
            .insert(parent, list.into_iter().map(|(_, id)| id).collect());
    }

    // Roots per view and the pinned list, honoring the recorded lists first.
    let listed_roots: HashMap<NodeId, usize> = snapshot
        .views
        .iter()
        .flat_map(|v| v.roots.iter().enumerate().map(|(i, id)| (*id, i)))
        .collect();
    let listed_pinned: HashMap<NodeId, usize> = snapshot
        .pinned_order
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    let mut pinned: Vec<(usize, usize, NodeId)> = Vec::new();
    let mut roots: HashMap<ViewId, Vec<(usize, usize, NodeId)>> = HashMap::new();
    for node in store.nodes.values().filter(|n| n.window_id == window_id) {
        let order = records.get(&node.id).map_or(0, |r| r.child_order);
        if node.pinned {
            let listed = listed_pinned.get(&node.id).copied().unwrap_or(usize::MAX);
            pinned.push((listed, order, node.id));
        } else if node.parent_id.is_none() {
            let listed = listed_roots.get(&node.id).copied().unwrap_or(usize::MAX);
            roots
                .entry(node.view_id.clone())
                .or_default()
                .push((listed, order, node.id));
        }
    }
    pinned.sort();
    state.pinned = pinned.into_iter().map(|(_, _, id)| id).collect();
    for view in &mut state.views {
        if let Some(mut list) = roots.remove(&view.id) {
            list.sort();
            view.roots = list.into_iter().map(|(_, _, id)| id).collect();
        }
    }

    let top_level: Vec<NodeId> = state
        .pinned
        .iter()
        .chain(state.views.iter().flat_map(|v| v.roots.iter()))
        .copied()
        .collect();
    store.windows.insert(window_id, state);
    for id in top_level {
        if let Err(e) = store.refresh_subtree(id) {
            warnings.push(format!("window {window_id}: {e}"));
        }
    }
}
