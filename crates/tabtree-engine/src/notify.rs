//! Coarse "state updated" broadcast to UI observers.

use tabtree_types::Notification;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 64;

/// One-way broadcast of tree changes. Observers re-read the snapshot; no diff
/// is carried, so a lagging receiver loses nothing by skipping messages.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Announce that the tree reached `revision`. Returns the number of observers reached.
    pub fn publish(&self, revision: u64) -> usize {
        let reached = self
            .tx
            .send(Notification::StateUpdated { revision })
            .unwrap_or(0);
        trace!(revision, observers = reached, "State update published");
        reached
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
