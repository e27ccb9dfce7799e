//! Native event adapter.
//!
//! Turns browser lifecycle events into tree commands and applies the ones
//! that only touch the store. Events about tabs the tree does not know are
//! dropped quietly: the tab was closed while the event was in flight.

use std::collections::HashSet;

use tabtree_config::{LinkPlacement, ManualPlacement, UrlMatcher, UserSettings};
use tabtree_core::{Placement, TreeError, TreeStore};
use tabtree_types::{NativeEvent, NativeTab, TabChange, TabId, WindowId};
use tracing::debug;

use crate::error::Result;

/// What handling a command did to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Effect {
    /// Nothing changed.
    None,
    /// Node fields or bookkeeping changed; native order is unaffected.
    Content,
    /// Tree shape changed; native order must be reasserted.
    Structure,
}

/// Normalized form of a native event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeCommand {
    Create { tab: NativeTab, placement: Placement },
    Remove { tab_id: TabId },
    Update { tab_id: TabId, change: TabChange },
    /// The tab now shows the engine's own UI and leaves the tree.
    Exclude { tab_id: TabId },
    Activate { tab_id: TabId },
    Replace { added: TabId, removed: TabId },
    /// A native reorder, possibly an echo of the engine's own move.
    CheckOrder {
        tab_id: TabId,
        window_id: WindowId,
        to_index: usize,
    },
    Attach { tab_id: TabId, window_id: WindowId },
    WindowOpened { window_id: WindowId },
    WindowClosed { window_id: WindowId },
}

/// Event normalization state: placement settings and excluded tabs.
#[derive(Debug, Clone)]
pub struct Adapter {
    settings: UserSettings,
    side_panel: UrlMatcher,
    excluded: HashSet<TabId>,
}

impl Adapter {
    pub fn new(settings: UserSettings, side_panel: UrlMatcher) -> Self {
        Self {
            settings,
            side_panel,
            excluded: HashSet::new(),
        }
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    /// Whether a tab shows the engine's own UI surface.
    pub fn is_side_panel(&self, tab: &NativeTab) -> bool {
        self.side_panel.matches(&tab.url)
    }

    pub fn is_excluded(&self, tab_id: TabId) -> bool {
        self.excluded.contains(&tab_id)
    }

    /// Remember tabs excluded during startup restore.
    pub fn exclude_all(&mut self, tabs: impl IntoIterator<Item = TabId>) {
        self.excluded.extend(tabs);
    }

    /// Map a native event to at most one tree command.
    pub fn normalize(&mut self, store: &TreeStore, event: NativeEvent) -> Option<TreeCommand> {
        match event {
            NativeEvent::TabCreated { tab } => {
                if self.is_side_panel(&tab) {
                    debug!(tab_id = %tab.id, "Excluding side panel tab");
                    self.excluded.insert(tab.id);
                    return None;
                }
                let placement = self.placement_for(store, &tab);
                Some(TreeCommand::Create { tab, placement })
            }
            NativeEvent::TabRemoved { tab_id, .. } => {
                if self.excluded.remove(&tab_id) {
                    return None;
                }
                Some(TreeCommand::Remove { tab_id })
            }
            NativeEvent::TabUpdated { tab_id, change } => {
                if self.excluded.contains(&tab_id) {
                    return None;
                }
                if change.url.as_deref().is_some_and(|url| self.side_panel.matches(url)) {
                    self.excluded.insert(tab_id);
                    return Some(TreeCommand::Exclude { tab_id });
                }
                Some(TreeCommand::Update { tab_id, change })
            }
            NativeEvent::TabMoved {
                tab_id,
                window_id,
                to_index,
                ..
            } => (!self.excluded.contains(&tab_id)).then_some(TreeCommand::CheckOrder {
                tab_id,
                window_id,
                to_index,
            }),
            NativeEvent::TabAttached {
                tab_id, window_id, ..
            } => (!self.excluded.contains(&tab_id))
                .then_some(TreeCommand::Attach { tab_id, window_id }),
            NativeEvent::TabDetached { tab_id, .. } => {
                debug!(tab_id = %tab_id, "Detach ignored until attach");
                None
            }
            NativeEvent::TabActivated { tab_id, .. } => {
                (!self.excluded.contains(&tab_id)).then_some(TreeCommand::Activate { tab_id })
            }
            NativeEvent::TabReplaced { added, removed } => {
                if self.excluded.remove(&removed) {
                    self.excluded.insert(added);
                    return None;
                }
                Some(TreeCommand::Replace { added, removed })
            }
            NativeEvent::WindowCreated { window_id } => Some(TreeCommand::WindowOpened { window_id }),
            NativeEvent::WindowRemoved { window_id } => Some(TreeCommand::WindowClosed { window_id }),
        }
    }

    /// Where a newly created tab goes, per the user's placement settings.
    fn placement_for(&self, store: &TreeStore, tab: &NativeTab) -> Placement {
        if tab.pinned {
            return Placement::End;
        }
        if let Some(opener) = tab.opener_tab_id.filter(|o| store.contains_tab(*o)) {
            return match self.settings.new_tab_position_from_link {
                LinkPlacement::End => Placement::End,
                LinkPlacement::Child => Placement::Child(opener),
                LinkPlacement::Sibling => Placement::Sibling(opener),
            };
        }
        match self.settings.new_tab_position_manual {
            ManualPlacement::End => Placement::End,
            ManualPlacement::Child => store
                .window(tab.window_id)
                .and_then(|w| w.active_tab)
                .filter(|active| *active != tab.id)
                .map_or(Placement::End, Placement::Child),
        }
    }

    /// Apply a command that only touches the store.
    ///
    /// Order checks and attaches need the native API and are handled by the
    /// engine; they report [`Effect::Structure`] here.
    pub fn apply(&mut self, store: &mut TreeStore, command: TreeCommand) -> Result<Effect> {
        let result = match command {
            TreeCommand::Create { tab, placement } => store
                .create_node(&tab, placement)
                .map(|_| Effect::Structure),
            TreeCommand::Remove { tab_id } => store.remove_node(tab_id).map(|_| Effect::Structure),
            TreeCommand::Update { tab_id, change } => apply_update(store, tab_id, change),
            TreeCommand::Exclude { tab_id } => {
                debug!(tab_id = %tab_id, "Tab navigated to side panel, excluding");
                store.remove_node(tab_id).map(|_| Effect::Structure)
            }
            TreeCommand::Activate { tab_id } => store.activate(tab_id).map(|_| Effect::Content),
            TreeCommand::Replace { added, removed } => store
                .replace_tab_id(removed, added)
                .map(|_| Effect::Content),
            TreeCommand::WindowOpened { window_id } => store
                .ensure_window(window_id)
                .map(|created| if created { Effect::Content } else { Effect::None }),
            TreeCommand::WindowClosed { window_id } => store.remove_window(window_id).map(|_| Effect::Content),
            TreeCommand::CheckOrder { .. } | TreeCommand::Attach { .. } => Ok(Effect::Structure),
        };

        match result {
            Ok(effect) => Ok(effect),
            Err(e) if is_benign(&e) => {
                debug!(error = %e, "Ignoring event for unknown or known tab");
                Ok(Effect::None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn apply_update(store: &mut TreeStore, tab_id: TabId, change: TabChange) -> tabtree_core::Result<Effect> {
    let mut effect = Effect::None;
    if let Some(pinned) = change.pinned
        && store.set_pinned(tab_id, pinned)?
    {
        effect = Effect::Structure;
    }
    let fields = TabChange {
        pinned: None,
        ..change
    };
    if !fields.is_empty() {
        store.update_tab(tab_id, &fields)?;
        effect = effect.max(Effect::Content);
    }
    Ok(effect)
}

/// Races with removal and duplicate reports are not errors for native events.
fn is_benign(error: &TreeError) -> bool {
    matches!(error, TreeError::UnknownTab(_) | TreeError::DuplicateTab(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabtree_config::DEFAULT_SIDE_PANEL_PATTERN;

    const W: WindowId = WindowId(1);

    fn adapter(settings: UserSettings) -> Adapter {
        let matcher = UrlMatcher::new(&[DEFAULT_SIDE_PANEL_PATTERN.to_string()]).unwrap();
        Adapter::new(settings, matcher)
    }

    fn created(id: i64, index: usize) -> NativeEvent {
        NativeEvent::TabCreated {
            tab: NativeTab::new(TabId(id), W, index).with_url(format!("https://site/{id}")),
        }
    }

    fn handle(adapter: &mut Adapter, store: &mut TreeStore, event: NativeEvent) -> Effect {
        match adapter.normalize(store, event) {
            Some(command) => adapter.apply(store, command).unwrap(),
            None => Effect::None,
        }
    }

    #[test]
    fn test_link_tab_becomes_child_of_opener() {
        let mut adapter = adapter(UserSettings::default());
        let mut store = TreeStore::new();
        handle(&mut adapter, &mut store, created(1, 0));
        let link = NativeEvent::TabCreated {
            tab: NativeTab::new(TabId(2), W, 1).with_opener(TabId(1)),
        };
        assert_eq!(handle(&mut adapter, &mut store, link), Effect::Structure);
        assert_eq!(
            store.node_for_tab(TabId(2)).unwrap().parent_id,
            store.node_id_for_tab(TabId(1))
        );
        assert!(store.is_unread(TabId(2)));
    }

    #[test]
    fn test_link_sibling_and_manual_child_settings() {
        let settings = UserSettings {
            new_tab_position_manual: ManualPlacement::Child,
            new_tab_position_from_link: LinkPlacement::Sibling,
            ..Default::default()
        };
        let mut adapter = adapter(settings);
        let mut store = TreeStore::new();
        handle(&mut adapter, &mut store, created(1, 0));
        let child = NativeEvent::TabCreated {
            tab: NativeTab::new(TabId(2), W, 1).with_opener(TabId(1)),
        };
        handle(&mut adapter, &mut store, child);
        handle(
            &mut adapter,
            &mut store,
            NativeEvent::TabActivated {
                tab_id: TabId(2),
                window_id: W,
            },
        );

        // Sibling of a root is a root.
        assert!(store.node_for_tab(TabId(2)).unwrap().is_root());

        // A manual tab becomes a child of the active tab.
        handle(&mut adapter, &mut store, created(3, 2));
        assert_eq!(
            store.node_for_tab(TabId(3)).unwrap().parent_id,
            store.node_id_for_tab(TabId(2))
        );
    }

    #[test]
    fn test_side_panel_excluded_everywhere() {
        let mut adapter = adapter(UserSettings::default());
        let mut store = TreeStore::new();
        let panel = NativeEvent::TabCreated {
            tab: NativeTab::new(TabId(5), W, 0).with_url("chrome-extension://abc/sidepanel.html"),
        };
        assert_eq!(handle(&mut adapter, &mut store, panel), Effect::None);
        assert!(!store.contains_tab(TabId(5)));
        assert!(adapter.is_excluded(TabId(5)));

        let moved = NativeEvent::TabMoved {
            tab_id: TabId(5),
            window_id: W,
            from_index: 0,
            to_index: 1,
        };
        assert!(adapter.normalize(&store, moved).is_none());

        let removed = NativeEvent::TabRemoved {
            tab_id: TabId(5),
            window_id: W,
            window_closing: false,
        };
        assert!(adapter.normalize(&store, removed).is_none());
        assert!(!adapter.is_excluded(TabId(5)));
    }

    #[test]
    fn test_navigation_to_side_panel_removes_node() {
        let mut adapter = adapter(UserSettings::default());
        let mut store = TreeStore::new();
        handle(&mut adapter, &mut store, created(1, 0));
        let nav = NativeEvent::TabUpdated {
            tab_id: TabId(1),
            change: TabChange {
                url: Some("chrome-extension://abc/sidepanel.html?x".into()),
                ..Default::default()
            },
        };
        assert_eq!(handle(&mut adapter, &mut store, nav), Effect::Structure);
        assert!(!store.contains_tab(TabId(1)));
        assert!(adapter.is_excluded(TabId(1)));
    }

    #[test]
    fn test_unknown_tab_events_are_noops() {
        let mut adapter = adapter(UserSettings::default());
        let mut store = TreeStore::new();
        for event in [
            NativeEvent::TabRemoved {
                tab_id: TabId(9),
                window_id: W,
                window_closing: false,
            },
            NativeEvent::TabActivated {
                tab_id: TabId(9),
                window_id: W,
            },
            NativeEvent::TabUpdated {
                tab_id: TabId(9),
                change: TabChange {
                    title: Some("x".into()),
                    ..Default::default()
                },
            },
        ] {
            assert_eq!(handle(&mut adapter, &mut store, event), Effect::None);
        }
        handle(&mut adapter, &mut store, created(1, 0));
        assert_eq!(handle(&mut adapter, &mut store, created(1, 0)), Effect::None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_pin_update_is_structural() {
        let mut adapter = adapter(UserSettings::default());
        let mut store = TreeStore::new();
        handle(&mut adapter, &mut store, created(1, 0));
        let pin = NativeEvent::TabUpdated {
            tab_id: TabId(1),
            change: TabChange {
                pinned: Some(true),
                title: Some("Pinned".into()),
                ..Default::default()
            },
        };
        assert_eq!(handle(&mut adapter, &mut store, pin), Effect::Structure);
        let node = store.node_for_tab(TabId(1)).unwrap();
        assert!(node.pinned);
        assert_eq!(node.title, "Pinned");
    }

    #[test]
    fn test_replace_keeps_excluded_tracking() {
        let mut adapter = adapter(UserSettings::default());
        let store = TreeStore::new();
        adapter.exclude_all([TabId(3)]);
        let replaced = NativeEvent::TabReplaced {
            added: TabId(4),
            removed: TabId(3),
        };
        assert!(adapter.normalize(&store, replaced).is_none());
        assert!(adapter.is_excluded(TabId(4)));
        assert!(!adapter.is_excluded(TabId(3)));
    }
}
