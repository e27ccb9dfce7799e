//! In-process browser implementing the native tab/window API.
//!
//! Keeps per-window tab strips in index order and records the lifecycle
//! events a real browser would emit for every change, including changes the
//! engine itself requested. Callers drain the log with
//! [`SimulatedBrowser::take_events`] and feed it back to the engine.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tabtree_types::{
    CreateTab, NativeError, NativeEvent, NativeResult, NativeTab, NativeWindow, TabApi, TabChange,
    TabId, UpdateTab, WindowApi, WindowId,
};

#[derive(Debug, Default)]
struct WindowRecord {
    focused: bool,
    tabs: Vec<NativeTab>,
}

#[derive(Debug, Default)]
struct BrowserState {
    next_tab: i64,
    next_window: i64,
    windows: BTreeMap<WindowId, WindowRecord>,
    events: Vec<NativeEvent>,
    rejected_updates: usize,
}

impl BrowserState {
    fn tab_id(&mut self) -> TabId {
        self.next_tab += 1;
        TabId(self.next_tab)
    }

    fn window_id(&mut self) -> WindowId {
        self.next_window += 1;
        WindowId(self.next_window)
    }

    fn locate(&self, tab_id: TabId) -> NativeResult<(WindowId, usize)> {
        self.windows
            .iter()
            .find_map(|(id, w)| w.tabs.iter().position(|t| t.id == tab_id).map(|i| (*id, i)))
            .ok_or(NativeError::TabNotFound(tab_id))
    }

    fn window(&mut self, id: WindowId) -> NativeResult<&mut WindowRecord> {
        self.windows.get_mut(&id).ok_or(NativeError::WindowNotFound(id))
    }

    fn open_window(&mut self, focused: bool) -> WindowId {
        let id = self.window_id();
        if focused {
            for window in self.windows.values_mut() {
                window.focused = false;
            }
        }
        self.windows.insert(
            id,
            WindowRecord {
                focused,
                tabs: Vec::new(),
            },
        );
        self.events.push(NativeEvent::WindowCreated { window_id: id });
        id
    }

    fn activate(&mut self, tab_id: TabId) -> NativeResult<()> {
        let (window_id, index) = self.locate(tab_id)?;
        let window = self.window(window_id)?;
        if window.tabs[index].active {
            return Ok(());
        }
        for tab in &mut window.tabs {
            tab.active = tab.id == tab_id;
        }
        self.events.push(NativeEvent::TabActivated { tab_id, window_id });
        Ok(())
    }

    fn insert_tab(&mut self, window_id: WindowId, mut tab: NativeTab, index: usize) -> NativeResult<usize> {
        let window = self.window(window_id)?;
        let pinned_count = window.tabs.iter().filter(|t| t.pinned).count();
        let index = clamp_index(index, tab.pinned, pinned_count, window.tabs.len());
        tab.window_id = window_id;
        window.tabs.insert(index, tab);
        renumber(&mut window.tabs);
        Ok(index)
    }

    fn remove_from_window(&mut self, tab_id: TabId) -> NativeResult<(WindowId, usize, NativeTab)> {
        let (window_id, index) = self.locate(tab_id)?;
        let window = self.window(window_id)?;
        let tab = window.tabs.remove(index);
        renumber(&mut window.tabs);
        Ok((window_id, index, tab))
    }

    fn close_window_if_empty(&mut self, window_id: WindowId) {
        if self
            .windows
            .get(&window_id)
            .is_some_and(|w| w.tabs.is_empty())
        {
            self.windows.remove(&window_id);
            self.events.push(NativeEvent::WindowRemoved { window_id });
        }
    }

    fn move_tab(&mut self, tab_id: TabId, window_id: WindowId, index: usize) -> NativeResult<usize> {
        self.window(window_id)?;
        let (from_window, from_index) = self.locate(tab_id)?;

        if from_window == window_id {
            let window = self.window(window_id)?;
            let tab = window.tabs.remove(from_index);
            let pinned_count = window.tabs.iter().filter(|t| t.pinned).count();
            let to_index = clamp_index(index, tab.pinned, pinned_count, window.tabs.len());
            window.tabs.insert(to_index, tab);
            renumber(&mut window.tabs);
            if to_index != from_index {
                self.events.push(NativeEvent::TabMoved {
                    tab_id,
                    window_id,
                    from_index,
                    to_index,
                });
            }
            return Ok(to_index);
        }

        let (_, old_position, mut tab) = self.remove_from_window(tab_id)?;
        tab.active = false;
        self.events.push(NativeEvent::TabDetached {
            tab_id,
            window_id: from_window,
            position: old_position,
        });
        let position = self.insert_tab(window_id, tab, index)?;
        self.events.push(NativeEvent::TabAttached {
            tab_id,
            window_id,
            position,
        });
        self.close_window_if_empty(from_window);
        Ok(position)
    }
}

fn clamp_index(index: usize, pinned: bool, pinned_count: usize, len: usize) -> usize {
    if pinned {
        index.min(pinned_count)
    } else {
        index.clamp(pinned_count, len.max(pinned_count))
    }
}

fn renumber(tabs: &mut [NativeTab]) {
    for (i, tab) in tabs.iter_mut().enumerate() {
        tab.index = i;
    }
}

/// A fake browser with scriptable user actions.
#[derive(Debug, Default)]
pub struct SimulatedBrowser {
    state: Mutex<BrowserState>,
}

impl SimulatedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a focused window with no tabs.
    pub fn open_window(&self) -> WindowId {
        self.state.lock().open_window(true)
    }

    /// Open a tab as a user would. `opener` marks it as opened from a link.
    pub fn open_tab(
        &self,
        window_id: WindowId,
        url: &str,
        opener: Option<TabId>,
        active: bool,
    ) -> NativeResult<NativeTab> {
        let mut state = self.state.lock();
        let len = state.window(window_id)?.tabs.len();
        // Link tabs open right after the opener; others at the end.
        let index = match opener.map(|o| state.locate(o)) {
            Some(Ok((w, i))) if w == window_id => i + 1,
            _ => len,
        };
        drop(state);
        self.create_tab_sync(CreateTab {
            window_id: Some(window_id),
            url: Some(url.to_string()),
            opener_tab_id: opener,
            index: Some(index),
            active,
            pinned: false,
        })
    }

    /// Navigate a tab.
    pub fn navigate(&self, tab_id: TabId, url: &str) -> NativeResult<()> {
        let mut state = self.state.lock();
        let (window_id, index) = state.locate(tab_id)?;
        state.window(window_id)?.tabs[index].url = url.to_string();
        state.events.push(NativeEvent::TabUpdated {
            tab_id,
            change: TabChange {
                url: Some(url.to_string()),
                ..Default::default()
            },
        });
        Ok(())
    }

    /// Swap a tab's id, as happens when a discarded tab is reloaded.
    pub fn replace_tab(&self, tab_id: TabId) -> NativeResult<TabId> {
        let mut state = self.state.lock();
        let (window_id, index) = state.locate(tab_id)?;
        let added = state.tab_id();
        state.window(window_id)?.tabs[index].id = added;
        state.events.push(NativeEvent::TabReplaced {
            added,
            removed: tab_id,
        });
        Ok(added)
    }

    /// Tab ids of a window in index order.
    pub fn order(&self, window_id: WindowId) -> Vec<TabId> {
        self.state
            .lock()
            .windows
            .get(&window_id)
            .map(|w| w.tabs.iter().map(|t| t.id).collect())
            .unwrap_or_default()
    }

    pub fn tab(&self, tab_id: TabId) -> Option<NativeTab> {
        let state = self.state.lock();
        let (window_id, index) = state.locate(tab_id).ok()?;
        state.windows.get(&window_id).map(|w| w.tabs[index].clone())
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        self.state.lock().windows.keys().copied().collect()
    }

    /// Drain the recorded events.
    pub fn take_events(&self) -> Vec<NativeEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    /// Make the next `count` tab updates fail with [`NativeError::Rejected`].
    pub fn fail_next_updates(&self, count: usize) {
        self.state.lock().rejected_updates = count;
    }

    /// Drop recorded events without delivering them.
    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    fn create_tab_sync(&self, request: CreateTab) -> NativeResult<NativeTab> {
        let mut state = self.state.lock();
        let window_id = match request.window_id {
            Some(id) => id,
            None => match state.windows.iter().find(|(_, w)| w.focused) {
                Some((id, _)) => *id,
                None => state.open_window(true),
            },
        };
        let len = state.window(window_id)?.tabs.len();

        let id = state.tab_id();
        let mut tab = NativeTab::new(id, window_id, 0)
            .with_url(request.url.unwrap_or_default())
            .with_pinned(request.pinned);
        tab.opener_tab_id = request.opener_tab_id;
        tab.active = request.active;
        let index = state.insert_tab(window_id, tab, request.index.unwrap_or(len))?;

        let window = state.window(window_id)?;
        if request.active {
            for other in window.tabs.iter_mut().filter(|t| t.id != id) {
                other.active = false;
            }
        }
        let created = window.tabs[index].clone();
        state.events.push(NativeEvent::TabCreated {
            tab: created.clone(),
        });
        if request.active {
            state.events.push(NativeEvent::TabActivated { tab_id: id, window_id });
        }
        Ok(created)
    }
}

#[async_trait]
impl TabApi for SimulatedBrowser {
    async fn query_tabs(&self, window_id: Option<WindowId>) -> NativeResult<Vec<NativeTab>> {
        let state = self.state.lock();
        match window_id {
            Some(id) => state
                .windows
                .get(&id)
                .map(|w| w.tabs.clone())
                .ok_or(NativeError::WindowNotFound(id)),
            None => Ok(state
                .windows
                .values()
                .flat_map(|w| w.tabs.iter().cloned())
                .collect()),
        }
    }

    async fn create_tab(&self, request: CreateTab) -> NativeResult<NativeTab> {
        self.create_tab_sync(request)
    }

    async fn remove_tab(&self, tab_id: TabId) -> NativeResult<()> {
        let mut state = self.state.lock();
        let (window_id, _, _) = state.remove_from_window(tab_id)?;
        let window_closing = state
            .windows
            .get(&window_id)
            .is_some_and(|w| w.tabs.is_empty());
        state.events.push(NativeEvent::TabRemoved {
            tab_id,
            window_id,
            window_closing,
        });
        state.close_window_if_empty(window_id);
        Ok(())
    }

    async fn update_tab(&self, tab_id: TabId, update: UpdateTab) -> NativeResult<NativeTab> {
        let mut state = self.state.lock();
        let (window_id, index) = state.locate(tab_id)?;
        if state.rejected_updates > 0 {
            state.rejected_updates -= 1;
            return Err(NativeError::Rejected(format!("update of tab {tab_id}")));
        }

        if let Some(url) = update.url {
            state.window(window_id)?.tabs[index].url = url.clone();
            state.events.push(NativeEvent::TabUpdated {
                tab_id,
                change: TabChange {
                    url: Some(url),
                    ..Default::default()
                },
            });
        }

        if let Some(pinned) = update.pinned {
            let window = state.window(window_id)?;
            if window.tabs[index].pinned != pinned {
                // Pinning moves the tab to the end of the pinned region,
                // unpinning to the start of the unpinned region.
                let mut tab = window.tabs.remove(index);
                tab.pinned = pinned;
                let pinned_count = window.tabs.iter().filter(|t| t.pinned).count();
                window.tabs.insert(pinned_count, tab);
                renumber(&mut window.tabs);
                state.events.push(NativeEvent::TabUpdated {
                    tab_id,
                    change: TabChange {
                        pinned: Some(pinned),
                        ..Default::default()
                    },
                });
                if pinned_count != index {
                    state.events.push(NativeEvent::TabMoved {
                        tab_id,
                        window_id,
                        from_index: index,
                        to_index: pinned_count,
                    });
                }
            }
        }

        if update.active == Some(true) {
            state.activate(tab_id)?;
        }

        let (window_id, index) = state.locate(tab_id)?;
        Ok(state.window(window_id)?.tabs[index].clone())
    }

    async fn move_tab(&self, tab_id: TabId, window_id: WindowId, index: usize) -> NativeResult<()> {
        self.state.lock().move_tab(tab_id, window_id, index).map(|_| ())
    }
}

#[async_trait]
impl WindowApi for SimulatedBrowser {
    async fn query_windows(&self) -> NativeResult<Vec<NativeWindow>> {
        Ok(self
            .state
            .lock()
            .windows
            .iter()
            .map(|(id, w)| NativeWindow {
                id: *id,
                focused: w.focused,
            })
            .collect())
    }

    async fn create_window(&self, tab_id: Option<TabId>) -> NativeResult<NativeWindow> {
        let mut state = self.state.lock();
        if let Some(tab_id) = tab_id {
            state.locate(tab_id)?;
        }
        let id = state.open_window(true);
        drop(state);

        match tab_id {
            Some(tab_id) => {
                self.state.lock().move_tab(tab_id, id, 0)?;
                self.state.lock().activate(tab_id)?;
            }
            None => {
                self.create_tab_sync(CreateTab {
                    window_id: Some(id),
                    url: Some("chrome://newtab/".to_string()),
                    active: true,
                    ..Default::default()
                })?;
            }
        }
        Ok(NativeWindow { id, focused: true })
    }

    async fn remove_window(&self, window_id: WindowId) -> NativeResult<()> {
        let mut state = self.state.lock();
        let window = state
            .windows
            .remove(&window_id)
            .ok_or(NativeError::WindowNotFound(window_id))?;
        for tab in window.tabs {
            state.events.push(NativeEvent::TabRemoved {
                tab_id: tab.id,
                window_id,
                window_closing: true,
            });
        }
        state.events.push(NativeEvent::WindowRemoved { window_id });
        Ok(())
    }

    async fn update_window(&self, window_id: WindowId, focused: bool) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.window(window_id)?;
        for (id, window) in state.windows.iter_mut() {
            if *id == window_id {
                window.focused = focused;
            } else if focused {
                window.focused = false;
            }
        }
        Ok(())
    }
}
