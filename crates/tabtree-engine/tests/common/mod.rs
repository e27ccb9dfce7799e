//! Common test utilities for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::task::JoinHandle;

use tabtree_core::TreeStore;
use tabtree_engine::{Engine, EngineHandle, EngineOptions, MemoryStore, SimulatedBrowser};
use tabtree_types::{NativeTab, NodeId, TabId, WindowId};

/// Rounds of event delivery before a session is considered stuck.
const MAX_PUMP_ROUNDS: usize = 50;

/// An engine running against a simulated browser and in-memory storage.
pub struct TestEngine {
    pub browser: Arc<SimulatedBrowser>,
    pub storage: Arc<MemoryStore>,
    pub handle: EngineHandle,
    task: JoinHandle<()>,
}

impl TestEngine {
    /// Start an engine over `browser` with fresh storage.
    pub async fn start(browser: Arc<SimulatedBrowser>) -> Result<Self> {
        Self::start_with(browser, Arc::new(MemoryStore::new()), EngineOptions::default()).await
    }

    /// Start an engine. Events recorded before startup are discarded, as a
    /// real browser does not replay them.
    pub async fn start_with(
        browser: Arc<SimulatedBrowser>,
        storage: Arc<MemoryStore>,
        options: EngineOptions,
    ) -> Result<Self> {
        browser.clear_events();
        let (handle, task) = Engine::start(browser.clone(), storage.clone(), options).await?;
        let engine = Self {
            browser,
            storage,
            handle,
            task,
        };
        engine.pump().await?;
        Ok(engine)
    }

    /// Deliver browser events to the engine until the browser goes quiet.
    ///
    /// Fails if the engine and the browser keep producing events for each
    /// other (a move loop).
    pub async fn pump(&self) -> Result<()> {
        for _ in 0..MAX_PUMP_ROUNDS {
            let events = self.browser.take_events();
            if events.is_empty() {
                return Ok(());
            }
            for event in events {
                self.handle.send_native(event).await?;
            }
            self.handle.ping().await?;
        }
        bail!("browser and engine did not settle after {MAX_PUMP_ROUNDS} rounds")
    }

    /// The engine's current tree, rebuilt into a queryable store.
    pub async fn tree(&self) -> Result<TreeStore> {
        let snapshot = self.handle.snapshot().await?;
        let (store, warnings) = TreeStore::from_snapshot(&snapshot);
        if !warnings.is_empty() {
            bail!("snapshot did not load cleanly: {warnings:?}");
        }
        Ok(store)
    }

    pub async fn node(&self, tab: TabId) -> Result<NodeId> {
        match self.tree().await?.node_id_for_tab(tab) {
            Some(id) => Ok(id),
            None => bail!("tab {tab} is not in the tree"),
        }
    }

    /// Stop the engine and wait for the worker to exit.
    pub async fn stop(self) -> Result<(Arc<SimulatedBrowser>, Arc<MemoryStore>)> {
        self.handle.shutdown().await?;
        self.task.await?;
        Ok((self.browser, self.storage))
    }

    /// Open a tab as the user would and let the engine see it.
    pub async fn open(&self, window: WindowId, opener: Option<TabId>, active: bool) -> Result<NativeTab> {
        let tab = self
            .browser
            .open_tab(window, "https://example.com/", opener, active)?;
        self.pump().await?;
        Ok(tab)
    }
}

/// Tab id of a node's parent.
pub fn parent_of(store: &TreeStore, tab: TabId) -> Option<TabId> {
    store
        .node_for_tab(tab)
        .and_then(|n| n.parent_id)
        .and_then(|p| store.node(p))
        .map(|p| p.tab_id)
}

/// Root tabs of a window's first view, in order.
pub fn roots(store: &TreeStore, window: WindowId) -> Vec<TabId> {
    store
        .window(window)
        .and_then(|w| w.views.first())
        .map(|v| {
            v.roots
                .iter()
                .filter_map(|id| store.node(*id).map(|n| n.tab_id))
                .collect()
        })
        .unwrap_or_default()
}

/// Pinned tabs of a window, in order.
pub fn pinned(store: &TreeStore, window: WindowId) -> Vec<TabId> {
    store
        .window(window)
        .map(|w| {
            w.pinned
                .iter()
                .filter_map(|id| store.node(*id).map(|n| n.tab_id))
                .collect()
        })
        .unwrap_or_default()
}
