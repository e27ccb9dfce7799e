//! Tab tree synchronization engine.
//!
//! Keeps a [`TreeStore`](tabtree_core::TreeStore) in sync with a browser:
//!
//! - **Adapter** normalizes native tab/window events into tree commands
//! - **Reconciler** reasserts the tree's order on the browser's tab strip
//! - **Persistence** saves the tree (debounced) and restores it at startup
//! - **Drag** resolves drag-and-drop gestures, including hover auto-expand
//! - **Notify** tells UI observers to re-read state
//!
//! All of it runs on one worker task fed by a bounded queue; see [`Engine`].
//!
//! ```rust,ignore
//! let (handle, _task) = Engine::start(browser, storage, EngineOptions::default()).await?;
//! handle.send_native(event).await?;
//! let tree = handle.snapshot().await?;
//! ```

pub mod adapter;
pub mod drag;
pub mod engine;
pub mod error;
pub mod notify;
pub mod persistence;
pub mod reconciler;
pub mod simulated;
pub mod storage;

pub use adapter::{Adapter, Effect, TreeCommand};
pub use drag::{DragController, DropAction, DropPosition};
pub use engine::{Engine, EngineCommand, EngineHandle, EngineOptions, UiCommand, UiReply};
pub use error::{EngineError, Result};
pub use notify::NotificationBus;
pub use persistence::{LoadedState, PersistenceManager, SaveState};
pub use reconciler::{PlannedMove, Reconciler, plan_moves};
pub use simulated::SimulatedBrowser;
pub use storage::{FileStore, MemoryStore};
