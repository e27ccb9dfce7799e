//! Tree rendering for terminal and JSON output.

use std::collections::HashSet;

use chrono::Local;
use console::style;
use serde::Serialize;
use tabtree_core::{TreeSnapshot, TreeStore};
use tabtree_types::{NodeId, TabId, WindowId};

/// A snapshot reshaped for display: nested forests instead of parent links.
#[derive(Debug, Serialize)]
pub struct TreeView {
    pub saved_at: String,
    pub tabs: usize,
    pub windows: Vec<WindowView>,
}

#[derive(Debug, Serialize)]
pub struct WindowView {
    pub window_id: WindowId,
    pub pinned: Vec<TabView>,
    pub views: Vec<ViewView>,
}

#[derive(Debug, Serialize)]
pub struct ViewView {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub roots: Vec<TabView>,
}

#[derive(Debug, Serialize)]
pub struct TabView {
    pub tab_id: TabId,
    pub label: String,
    pub unread: bool,
    pub expanded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TabView>,
}

impl TreeView {
    /// Shape a store for display. `unread` overrides the store's own unread set,
    /// which a store rebuilt from a snapshot does not carry.
    pub fn build(store: &TreeStore, saved_at: String, unread: &HashSet<TabId>) -> Self {
        let windows = store
            .windows()
            .map(|window| WindowView {
                window_id: window.id,
                pinned: window
                    .pinned
                    .iter()
                    .filter_map(|id| tab_view(store, *id, unread))
                    .collect(),
                views: window
                    .views
                    .iter()
                    .map(|view| ViewView {
                        id: view.id.to_string(),
                        name: view.name.clone(),
                        active: view.id == window.active_view_id(),
                        roots: view
                            .roots
                            .iter()
                            .filter_map(|id| tab_view(store, *id, unread))
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            saved_at,
            tabs: store.len(),
            windows,
        }
    }

    pub fn from_snapshot(snapshot: &TreeSnapshot, unread: &HashSet<TabId>) -> (Self, Vec<String>) {
        let (store, warnings) = TreeStore::from_snapshot(snapshot);
        let saved_at = snapshot
            .saved_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        (Self::build(&store, saved_at, unread), warnings)
    }

    /// Indented text lines, one per window, view, and tab.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for window in &self.windows {
            out.push(format!("{}", style(format!("Window {}", window.window_id)).bold()));
            if !window.pinned.is_empty() {
                out.push(format!("  {}", style("Pinned").cyan()));
                for tab in &window.pinned {
                    push_tab(&mut out, tab, 2);
                }
            }
            for view in &window.views {
                let marker = if view.active { " (active)" } else { "" };
                out.push(format!("  {}{}", style(&view.name).cyan(), marker));
                if view.roots.is_empty() {
                    out.push(format!("    {}", style("(empty)").dim()));
                }
                for tab in &view.roots {
                    push_tab(&mut out, tab, 2);
                }
            }
        }
        out
    }
}

fn tab_view(store: &TreeStore, id: NodeId, unread: &HashSet<TabId>) -> Option<TabView> {
    let node = store.node(id)?;
    let label = if node.title.is_empty() {
        node.url.clone()
    } else {
        node.title.clone()
    };
    Some(TabView {
        tab_id: node.tab_id,
        label,
        unread: unread.contains(&node.tab_id),
        expanded: node.expanded,
        children: store
            .children(id)
            .iter()
            .filter_map(|child| tab_view(store, *child, unread))
            .collect(),
    })
}

fn push_tab(out: &mut Vec<String>, tab: &TabView, depth: usize) {
    let indent = "  ".repeat(depth);
    let mut line = format!("{indent}[{}] {}", tab.tab_id, tab.label);
    if tab.unread {
        line.push_str(&format!(" {}", style("*").yellow()));
    }
    if !tab.expanded && !tab.children.is_empty() {
        line.push_str(&format!(" {}", style(format!("(+{})", count(&tab.children))).dim()));
        out.push(line);
        return;
    }
    out.push(line);
    for child in &tab.children {
        push_tab(out, child, depth + 1);
    }
}

/// Number of tabs in a forest.
fn count(tabs: &[TabView]) -> usize {
    tabs.iter().map(|t| 1 + count(&t.children)).sum()
}
