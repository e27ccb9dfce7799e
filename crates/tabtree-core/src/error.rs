use tabtree_types::{NodeId, TabId, ViewId, WindowId};
use thiserror::Error;

/// Failure of a tree store operation. The store is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Unknown tab: {0}")]
    UnknownTab(TabId),

    #[error("Reparenting tab {child} under {parent} would create a cycle")]
    Cycle { child: TabId, parent: TabId },

    #[error("Invariant violated after {operation}: {}", violations.join("; "))]
    InvariantViolation {
        operation: &'static str,
        violations: Vec<String>,
    },

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Unknown view '{view}' in window {window}")]
    UnknownView { window: WindowId, view: ViewId },

    #[error("Unknown window: {0}")]
    UnknownWindow(WindowId),

    #[error("Tab {0} is not pinned")]
    NotPinned(TabId),

    #[error("Tab {0} is pinned")]
    PinnedTab(TabId),

    #[error("Tabs {0} and {1} are not siblings")]
    NotSiblings(TabId, TabId),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Tab {0} is already tracked")]
    DuplicateTab(TabId),

    #[error("Tab {tab} is not in window {window}")]
    WindowMismatch { tab: TabId, window: WindowId },

    #[error("Window {0} has only one view")]
    LastView(WindowId),
}

impl TreeError {
    /// Whether the error only means the referenced tab is gone.
    pub fn is_unknown_tab(&self) -> bool {
        matches!(self, TreeError::UnknownTab(_))
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
