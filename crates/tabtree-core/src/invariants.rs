//! Structural invariant checks for the tree store.
//!
//! Returns human-readable violations instead of failing fast so a single pass
//! reports everything that is wrong (used by transactions, the restore path,
//! and `tabtree check`).

use std::collections::HashMap;

use tabtree_types::NodeId;

use crate::store::TreeStore;

pub(crate) fn check(store: &TreeStore) -> Vec<String> {
    let mut violations = Vec::new();
    check_mapping(store, &mut violations);
    check_placement(store, &mut violations);
    check_depth_and_cycles(store, &mut violations);
    check_windows(store, &mut violations);
    violations
}

/// `tab_to_node` is a bijection onto `nodes`.
fn check_mapping(store: &TreeStore, violations: &mut Vec<String>) {
    for (tab, id) in &store.tab_to_node {
        match store.nodes.get(id) {
            None => violations.push(format!("tab {tab} maps to missing node {id}")),
            Some(node) if node.tab_id != *tab => violations.push(format!(
                "tab {tab} maps to node {id} which wraps tab {}",
                node.tab_id
            )),
            Some(_) => {}
        }
    }
    for node in store.nodes.values() {
        if store.tab_to_node.get(&node.tab_id) != Some(&node.id) {
            violations.push(format!(
                "node {} (tab {}) is missing from tab_to_node",
                node.id, node.tab_id
            ));
        }
    }
    for id in store.unread.iter() {
        if !store.nodes.contains_key(&id) {
            violations.push(format!("unread set holds missing node {id}"));
        }
    }
}

/// Every node sits in exactly one list, and that list agrees with its fields.
fn check_placement(store: &TreeStore, violations: &mut Vec<String>) {
    let mut seen: HashMap<NodeId, usize> = HashMap::new();

    for (parent_id, children) in &store.children {
        let Some(parent) = store.nodes.get(parent_id) else {
            if !children.is_empty() {
                violations.push(format!("children listed under missing node {parent_id}"));
            }
            continue;
        };
        if parent.pinned && !children.is_empty() {
            violations.push(format!("pinned node {parent_id} has children"));
        }
        for child_id in children {
            *seen.entry(*child_id).or_default() += 1;
            let Some(child) = store.nodes.get(child_id) else {
                violations.push(format!("node {parent_id} lists missing child {child_id}"));
                continue;
            };
            if child.parent_id != Some(*parent_id) {
                violations.push(format!(
                    "node {child_id} is listed under {parent_id} but has parent {:?}",
                    child.parent_id
                ));
            }
            if child.window_id != parent.window_id {
                violations.push(format!("node {child_id} and parent {parent_id} are in different windows"));
            }
            if child.view_id != parent.view_id {
                violations.push(format!("node {child_id} and parent {parent_id} are in different views"));
            }
        }
    }

    for window in store.windows.values() {
        for id in &window.pinned {
            *seen.entry(*id).or_default() += 1;
            match store.nodes.get(id) {
                None => violations.push(format!("window {} pins missing node {id}", window.id)),
                Some(node) => {
                    if !node.pinned || node.parent_id.is_some() || node.window_id != window.id {
                        violations.push(format!(
                            "node {id} is in window {}'s pinned list but is not a pinned root of it",
                            window.id
                        ));
                    }
                }
            }
        }
        for view in &window.views {
            for id in &view.roots {
                *seen.entry(*id).or_default() += 1;
                match store.nodes.get(id) {
                    None => violations.push(format!("view '{}' lists missing root {id}", view.id)),
                    Some(node) => {
                        if node.pinned
                            || node.parent_id.is_some()
                            || node.window_id != window.id
                            || node.view_id != view.id
                        {
                            violations.push(format!(
                                "node {id} is a root of view '{}' in window {} but does not belong there",
                                view.id, window.id
                            ));
                        }
                    }
                }
            }
        }
    }

    for node in store.nodes.values() {
        match seen.get(&node.id).copied().unwrap_or(0) {
            1 => {}
            0 => violations.push(format!("node {} is not reachable from any list", node.id)),
            n => violations.push(format!("node {} appears {n} times", node.id)),
        }
    }
}

/// Depth matches the parent chain, and no node is its own ancestor.
fn check_depth_and_cycles(store: &TreeStore, violations: &mut Vec<String>) {
    for node in store.nodes.values() {
        let expected = match node.parent_id {
            None => Some(0),
            Some(parent) => store.nodes.get(&parent).map(|p| p.depth + 1),
        };
        match expected {
            None => violations.push(format!("node {} has missing parent", node.id)),
            Some(depth) if depth != node.depth => violations.push(format!(
                "node {} has depth {} but expected {depth}",
                node.id, node.depth
            )),
            Some(_) => {}
        }

        let mut current = node.parent_id;
        let mut steps = 0;
        while let Some(parent) = current {
            if parent == node.id || steps > store.nodes.len() {
                violations.push(format!("node {} is its own ancestor", node.id));
                break;
            }
            steps += 1;
            current = store.nodes.get(&parent).and_then(|p| p.parent_id);
        }
    }
}

fn check_windows(store: &TreeStore, violations: &mut Vec<String>) {
    for (id, window) in &store.windows {
        if window.id != *id {
            violations.push(format!("window state keyed {id} has id {}", window.id));
        }
        if window.views.is_empty() {
            violations.push(format!("window {id} has no views"));
        }
        if let Some(tab) = window.active_tab
            && store.node_for_tab(tab).is_none_or(|n| n.window_id != *id)
        {
            violations.push(format!("window {id} has untracked active tab {tab}"));
        }
    }
    for node in store.nodes.values() {
        match store.windows.get(&node.window_id) {
            None => violations.push(format!("node {} is in unknown window {}", node.id, node.window_id)),
            Some(window) if !window.has_view(&node.view_id) => violations.push(format!(
                "node {} belongs to unknown view '{}'",
                node.id, node.view_id
            )),
            Some(_) => {}
        }
    }
}
