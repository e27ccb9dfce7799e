//! The engine worker and its handle.
//!
//! One task owns the [`TreeStore`] and drains a bounded command queue. Native
//! events, UI commands, and reads all go through the queue, so no two
//! commands ever interleave their effects on the tree. Each command runs to
//! completion (mutation, reconciliation, save scheduling, notification)
//! before the next one starts; the only suspension points are native API
//! calls and storage I/O. The debounced save and the drag auto-expand timer
//! are polled by the same loop, after queued commands.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tabtree_config::{
    DEFAULT_AUTO_EXPAND_DELAY_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_SAVE_DEBOUNCE_MS,
    DEFAULT_SIDE_PANEL_PATTERN, TabtreeConfig, UrlMatcher,
};
use tabtree_core::{InsertPosition, Relation, TreeError, TreeSnapshot, TreeStore};
use tabtree_types::{
    CreateTab, KeyValueStore, NativeApi, NativeEvent, NodeId, Notification, TabId, UpdateTab,
    ViewId, WindowId,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::adapter::{Adapter, Effect, TreeCommand};
use crate::drag::{DragController, DropPosition};
use crate::error::{EngineError, Result};
use crate::notify::NotificationBus;
use crate::persistence::PersistenceManager;
use crate::reconciler::Reconciler;

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime knobs, usually derived from [`TabtreeConfig`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub queue_capacity: usize,
    pub save_debounce: Duration,
    pub auto_expand_delay: Duration,
    pub side_panel: UrlMatcher,
}

impl EngineOptions {
    pub fn from_config(config: &TabtreeConfig) -> Result<Self> {
        let engine = config.engine();
        Ok(Self {
            queue_capacity: engine.queue_capacity,
            save_debounce: config.persistence().debounce(),
            auto_expand_delay: config.drag().auto_expand_delay(),
            side_panel: engine.side_panel_matcher()?,
        })
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            save_debounce: Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
            auto_expand_delay: Duration::from_millis(DEFAULT_AUTO_EXPAND_DELAY_MS),
            side_panel: UrlMatcher::new(&[DEFAULT_SIDE_PANEL_PATTERN.to_string()])
                .unwrap_or_default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Commands issued by UI surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UiCommand {
    Reparent {
        tab: TabId,
        parent: Option<TabId>,
        position: InsertPosition,
    },
    ReorderSiblings {
        tab: TabId,
        target: TabId,
        relation: Relation,
    },
    MovePinned {
        tab: TabId,
        target: TabId,
        relation: Relation,
    },
    /// Pin or unpin locally and in the browser.
    SetPinned { tab: TabId, pinned: bool },
    AssignToView { tab: TabId, view: ViewId },
    SetExpanded { tab: TabId, expanded: bool },
    CreateView { window: WindowId, name: String },
    RenameView {
        window: WindowId,
        view: ViewId,
        name: String,
    },
    RemoveView { window: WindowId, view: ViewId },
    SetActiveView { window: WindowId, view: ViewId },
    CloseTab { tab: TabId },
    /// Close a tab and all of its descendants.
    CloseSubtree { tab: TabId },
    ActivateTab { tab: TabId },
    NewTab {
        #[serde(default)]
        window: Option<WindowId>,
        #[serde(default)]
        opener: Option<TabId>,
        #[serde(default)]
        url: Option<String>,
    },
    MoveToNewWindow { tab: TabId },
    StartDrag { node: NodeId },
    HoverOverTab { node: NodeId },
    DropTab { position: DropPosition },
    CancelDrag,
}

/// Successful outcome of a [`UiCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "id", rename_all = "snake_case")]
pub enum UiReply {
    Done,
    ViewCreated(ViewId),
    TabOpened(TabId),
    WindowOpened(WindowId),
}

/// Everything the worker accepts through its queue.
#[derive(Debug)]
pub enum EngineCommand {
    Native(NativeEvent),
    Ui {
        command: UiCommand,
        reply: oneshot::Sender<Result<UiReply>>,
    },
    Snapshot(oneshot::Sender<TreeSnapshot>),
    Unread(oneshot::Sender<Vec<TabId>>),
    Flush(oneshot::Sender<Result<bool>>),
    /// Round trip through the queue; replies with the tree revision.
    Ping(oneshot::Sender<u64>),
    Shutdown(oneshot::Sender<()>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable front door to a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    bus: NotificationBus,
}

impl EngineHandle {
    /// Queue a native event. Waits for queue capacity.
    pub async fn send_native(&self, event: NativeEvent) -> Result<()> {
        self.tx
            .send(EngineCommand::Native(event))
            .await
            .map_err(|_| EngineError::Closed)
    }

    pub async fn ui(&self, command: UiCommand) -> Result<UiReply> {
        self.request(|reply| EngineCommand::Ui { command, reply }).await?
    }

    /// The current tree, as it would be persisted.
    pub async fn snapshot(&self) -> Result<TreeSnapshot> {
        self.request(EngineCommand::Snapshot).await
    }

    pub async fn unread(&self) -> Result<Vec<TabId>> {
        self.request(EngineCommand::Unread).await
    }

    /// Save immediately if a save is pending. Returns whether one was attempted.
    pub async fn flush(&self) -> Result<bool> {
        self.request(EngineCommand::Flush).await?
    }

    /// Wait until every command queued before this one has been handled.
    pub async fn ping(&self) -> Result<u64> {
        self.request(EngineCommand::Ping).await
    }

    /// Flush any pending save and stop the worker.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(EngineCommand::Shutdown).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    pub async fn start_drag(&self, node: NodeId) -> Result<()> {
        self.ui(UiCommand::StartDrag { node }).await.map(|_| ())
    }

    pub async fn hover_over_tab(&self, node: NodeId) -> Result<()> {
        self.ui(UiCommand::HoverOverTab { node }).await.map(|_| ())
    }

    pub async fn drop_tab(&self, position: DropPosition) -> Result<()> {
        self.ui(UiCommand::DropTab { position }).await.map(|_| ())
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────────────────

pub struct Engine {
    store: TreeStore,
    native: Arc<dyn NativeApi>,
    adapter: Adapter,
    reconciler: Reconciler,
    persistence: PersistenceManager,
    drag: DragController,
    bus: NotificationBus,
    rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    /// Restore the tree, align the browser with it, and spawn the worker.
    ///
    /// Unusable stored state never stops startup. Failing to query the
    /// browser does.
    pub async fn start(
        native: Arc<dyn NativeApi>,
        storage: Arc<dyn KeyValueStore>,
        options: EngineOptions,
    ) -> Result<(EngineHandle, JoinHandle<()>)> {
        let persistence = PersistenceManager::new(storage, options.save_debounce);
        let loaded = persistence.load().await;
        let tabs = native.query_tabs(None).await?;
        let windows = native.query_windows().await?;

        let mut adapter = Adapter::new(loaded.settings.clone(), options.side_panel);
        let (mut store, report) = TreeStore::restore(
            loaded.snapshot.as_ref(),
            &tabs,
            &loaded.unread,
            |tab| adapter.is_side_panel(tab),
        );
        for warning in &report.warnings {
            warn!(warning = %warning, "Restore dropped or repaired stored state");
        }
        adapter.exclude_all(report.excluded.iter().copied());
        for window in &windows {
            store.ensure_window(window.id)?;
        }
        info!(
            nodes = store.len(),
            windows = windows.len(),
            dropped = report.dropped.len(),
            created = report.created.len(),
            moved = report.moved.len(),
            excluded = report.excluded.len(),
            unread = report.unread_restored,
            "Tree restored"
        );

        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let bus = NotificationBus::new();
        let mut engine = Engine {
            store,
            native,
            drag: DragController::new(
                options.auto_expand_delay,
                loaded.settings.auto_expand_on_drag_hover,
            ),
            adapter,
            reconciler: Reconciler::new(),
            persistence,
            bus: bus.clone(),
            rx,
        };
        engine
            .reconciler
            .reconcile(&mut engine.store, engine.native.as_ref())
            .await?;
        engine.persistence.schedule(Instant::now());

        let task = tokio::spawn(engine.run());
        Ok((EngineHandle { tx, bus }, task))
    }

    async fn run(mut self) {
        loop {
            let save_at = self.persistence.deadline();
            let expand_at = self.drag.deadline();
            tokio::select! {
                biased;
                command = self.rx.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if !self.dispatch(command).await {
                        return;
                    }
                }
                () = wait_until(save_at) => {
                    // Failures are logged by the manager; the tree stays authoritative.
                    let _ = self.persistence.save(&self.store).await;
                }
                () = wait_until(expand_at) => {
                    self.auto_expand().await;
                }
            }
        }

        debug!("Command queue closed, flushing");
        let _ = self.persistence.flush(&self.store).await;
    }

    /// Handle one command. Returns `false` once the worker should stop.
    async fn dispatch(&mut self, command: EngineCommand) -> bool {
        let before = self.store.revision();
        match command {
            EngineCommand::Native(event) => {
                let kind = event.kind();
                let effect = match self.handle_native(event).await {
                    Ok(effect) => effect,
                    Err(e) => {
                        warn!(event = kind, error = %e, "Failed to handle native event");
                        Effect::None
                    }
                };
                self.settle(effect, before).await;
            }
            EngineCommand::Ui { command, reply } => {
                let result = match self.handle_ui(command).await {
                    Ok((value, effect)) => {
                        self.settle(effect, before).await;
                        Ok(value)
                    }
                    Err(e) => {
                        debug!(error = %e, "UI command rejected");
                        self.settle(Effect::None, before).await;
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.store.snapshot());
            }
            EngineCommand::Unread(reply) => {
                let _ = reply.send(self.store.unread_tab_ids());
            }
            EngineCommand::Flush(reply) => {
                let _ = reply.send(self.persistence.flush(&self.store).await);
            }
            EngineCommand::Ping(reply) => {
                let _ = reply.send(self.store.revision());
            }
            EngineCommand::Shutdown(reply) => {
                let _ = self.persistence.flush(&self.store).await;
                info!(revision = self.store.revision(), "Engine stopped");
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    /// Reassert native order after structural changes, then schedule a save
    /// and notify observers if anything changed.
    async fn settle(&mut self, effect: Effect, before: u64) {
        if effect == Effect::Structure
            && let Err(e) = self
                .reconciler
                .reconcile(&mut self.store, self.native.as_ref())
                .await
        {
            warn!(error = %e, "Reconciliation failed");
        }
        if self.store.revision() != before {
            self.persistence.schedule(Instant::now());
            self.bus.publish(self.store.revision());
        }
    }

    async fn handle_native(&mut self, event: NativeEvent) -> Result<Effect> {
        trace!(event = event.kind(), "Native event");
        let Some(command) = self.adapter.normalize(&self.store, event) else {
            return Ok(Effect::None);
        };

        match command {
            TreeCommand::CheckOrder {
                tab_id,
                window_id,
                to_index,
            } => {
                if self.reconciler.take_echo(tab_id, window_id, to_index) {
                    trace!(tab_id = %tab_id, index = to_index, "Ignoring echo of own move");
                    return Ok(Effect::None);
                }
                let Some(pinned) = self.store.node_for_tab(tab_id).map(|n| n.pinned) else {
                    debug!(tab_id = %tab_id, "Move of untracked tab");
                    return Ok(Effect::None);
                };
                debug!(tab_id = %tab_id, window_id = %window_id, index = to_index, "External move");
                if pinned {
                    self.reconciler
                        .adopt_pinned_order(&mut self.store, self.native.as_ref(), window_id)
                        .await?;
                }
                Ok(Effect::Structure)
            }
            TreeCommand::Attach { tab_id, window_id } => {
                self.reconciler.forget(tab_id);
                let attached = self
                    .reconciler
                    .adopt_attached(&mut self.store, self.native.as_ref(), tab_id, window_id)
                    .await?;
                Ok(if attached.is_some() {
                    Effect::Structure
                } else {
                    Effect::None
                })
            }
            TreeCommand::Remove { tab_id } => {
                self.reconciler.forget(tab_id);
                self.adapter.apply(&mut self.store, TreeCommand::Remove { tab_id })
            }
            TreeCommand::WindowClosed { window_id } => {
                self.reconciler.forget_window(window_id);
                self.adapter.apply(&mut self.store, TreeCommand::WindowClosed { window_id })
            }
            other => self.adapter.apply(&mut self.store, other),
        }
    }

    async fn handle_ui(&mut self, command: UiCommand) -> Result<(UiReply, Effect)> {
        let store = &mut self.store;
        let done = |effect| (UiReply::Done, effect);
        match command {
            UiCommand::Reparent {
                tab,
                parent,
                position,
            } => {
                store.reparent(tab, parent, position)?;
                Ok(done(Effect::Structure))
            }
            UiCommand::ReorderSiblings {
                tab,
                target,
                relation,
            } => {
                store.reorder_siblings(tab, target, relation)?;
                Ok(done(Effect::Structure))
            }
            UiCommand::MovePinned {
                tab,
                target,
                relation,
            } => {
                store.move_pinned(tab, target, relation)?;
                Ok(done(Effect::Structure))
            }
            UiCommand::SetPinned { tab, pinned } => {
                let current = store
                    .node_for_tab(tab)
                    .map(|n| n.pinned)
                    .ok_or(TreeError::UnknownTab(tab))?;
                if current == pinned {
                    return Ok(done(Effect::None));
                }
                // The browser goes first so a refused pin leaves the tree untouched.
                let update = UpdateTab {
                    pinned: Some(pinned),
                    ..Default::default()
                };
                match self.native.update_tab(tab, update).await {
                    Ok(_) => {}
                    Err(e) if e.is_missing() => debug!(tab_id = %tab, "Tab closed before pin update"),
                    Err(e) => return Err(e.into()),
                }
                store.set_pinned(tab, pinned)?;
                Ok(done(Effect::Structure))
            }
            UiCommand::AssignToView { tab, view } => {
                store.assign_to_view(tab, &view)?;
                Ok(done(Effect::Structure))
            }
            UiCommand::SetExpanded { tab, expanded } => {
                let changed = store.set_expanded(tab, expanded)?;
                Ok(done(if changed { Effect::Content } else { Effect::None }))
            }
            UiCommand::CreateView { window, name } => {
                let view = store.create_view(window, &name)?;
                Ok((UiReply::ViewCreated(view), Effect::Content))
            }
            UiCommand::RenameView { window, view, name } => {
                store.rename_view(window, &view, &name)?;
                Ok(done(Effect::Content))
            }
            UiCommand::RemoveView { window, view } => {
                store.remove_view(window, &view)?;
                Ok(done(Effect::Structure))
            }
            UiCommand::SetActiveView { window, view } => {
                store.set_active_view(window, &view)?;
                Ok(done(Effect::Content))
            }
            UiCommand::CloseTab { tab } => {
                store.node_for_tab(tab).ok_or(TreeError::UnknownTab(tab))?;
                self.remove_native(tab).await?;
                Ok(done(Effect::None))
            }
            UiCommand::CloseSubtree { tab } => {
                let id = store
                    .node_id_for_tab(tab)
                    .ok_or(TreeError::UnknownTab(tab))?;
                let tabs: Vec<TabId> = store
                    .subtree(id)
                    .into_iter()
                    .filter_map(|n| store.node(n).map(|n| n.tab_id))
                    .collect();
                for tab in tabs.into_iter().rev() {
                    self.remove_native(tab).await?;
                }
                Ok(done(Effect::None))
            }
            UiCommand::ActivateTab { tab } => {
                let window = store
                    .node_for_tab(tab)
                    .map(|n| n.window_id)
                    .ok_or(TreeError::UnknownTab(tab))?;
                match self.native.activate_tab(tab).await {
                    Ok(()) => {}
                    Err(e) if e.is_missing() => {
                        debug!(tab_id = %tab, "Tab closed before activation");
                        return Ok(done(Effect::None));
                    }
                    Err(e) => return Err(e.into()),
                }
                match self.native.update_window(window, true).await {
                    Ok(()) => {}
                    Err(e) if e.is_missing() => debug!(window_id = %window, "Window closed before focus"),
                    Err(e) => return Err(e.into()),
                }
                Ok(done(Effect::None))
            }
            UiCommand::NewTab {
                window,
                opener,
                url,
            } => {
                let window_id = window.or_else(|| {
                    opener.and_then(|o| store.node_for_tab(o).map(|n| n.window_id))
                });
                let tab = self
                    .native
                    .create_tab(CreateTab {
                        window_id,
                        url,
                        opener_tab_id: opener,
                        active: true,
                        ..Default::default()
                    })
                    .await?;
                Ok((UiReply::TabOpened(tab.id), Effect::None))
            }
            UiCommand::MoveToNewWindow { tab } => {
                store.node_for_tab(tab).ok_or(TreeError::UnknownTab(tab))?;
                let window = self.native.create_window(Some(tab)).await?;
                Ok((UiReply::WindowOpened(window.id), Effect::None))
            }
            UiCommand::StartDrag { node } => {
                self.drag.start_drag(store, node)?;
                Ok(done(Effect::None))
            }
            UiCommand::HoverOverTab { node } => {
                self.drag.hover(store, node, Instant::now())?;
                Ok(done(Effect::None))
            }
            UiCommand::DropTab { position } => {
                let action = self.drag.drop_on(store, position)?;
                action.apply(store)?;
                Ok(done(Effect::Structure))
            }
            UiCommand::CancelDrag => {
                self.drag.cancel();
                Ok(done(Effect::None))
            }
        }
    }

    /// Close a native tab; the tree follows through the removed event.
    async fn remove_native(&self, tab: TabId) -> Result<()> {
        match self.native.remove_tab(tab).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_missing() => {
                debug!(tab_id = %tab, "Tab already closed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn auto_expand(&mut self) {
        let before = self.store.revision();
        match self.drag.fire(&mut self.store, Instant::now()) {
            Ok(Some(tab)) => trace!(tab_id = %tab, "Hover timer expanded node"),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Hover auto-expand skipped"),
        }
        self.settle(Effect::Content, before).await;
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedBrowser;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_ui_command_wire_format() {
        let command: UiCommand = serde_json::from_value(json!({
            "command": "reparent",
            "tab": 3,
            "parent": 1,
            "position": {"kind": "first_child"}
        }))
        .unwrap();
        assert_eq!(
            command,
            UiCommand::Reparent {
                tab: TabId(3),
                parent: Some(TabId(1)),
                position: InsertPosition::FirstChild,
            }
        );

        let drop: UiCommand =
            serde_json::from_value(json!({"command": "drop_tab", "position": "child"})).unwrap();
        assert_eq!(
            drop,
            UiCommand::DropTab {
                position: DropPosition::Child
            }
        );

        let reply = serde_json::to_value(UiReply::TabOpened(TabId(4))).unwrap();
        assert_eq!(reply, json!({"reply": "tab_opened", "id": 4}));
    }

    #[test]
    fn test_options_from_config() {
        let config = TabtreeConfig::from_toml(
            r#"
            [persistence]
            debounce_ms = 50
            "#,
        )
        .unwrap();
        let options = EngineOptions::from_config(&config).unwrap();
        assert_eq!(options.save_debounce, Duration::from_millis(50));
        assert_eq!(options.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(!options.side_panel.is_empty());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let browser = Arc::new(SimulatedBrowser::new());
        let w = browser.open_window();
        browser.open_tab(w, "https://a", None, true).unwrap();
        browser.clear_events();
        let kv = Arc::new(MemoryStore::new());

        let (handle, task) = Engine::start(browser.clone(), kv.clone(), EngineOptions::default())
            .await
            .unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.node_count(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(kv.value(tabtree_types::TREE_STATE_KEY).is_some());
        assert!(matches!(handle.ping().await, Err(EngineError::Closed)));
    }
}
