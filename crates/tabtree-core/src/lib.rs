//! Tab tree store for the tabtree engine.
//!
//! The store keeps a hierarchical model of a browser's tabs as a flat arena
//! of nodes keyed by [`NodeId`](tabtree_types::NodeId):
//!
//! - **Nodes** wrap exactly one live native tab and reference their parent by id
//! - **Views** partition each window's roots into named forests
//! - **Pinned lists** order each window's pinned tabs outside the tree
//!
//! Every mutation is transactional and invariant-checked; see [`mutation`].
//! The store can be flattened into native tab order ([`TreeStore::native_order`]),
//! captured as a versioned [`TreeSnapshot`], and rebuilt against the live tab
//! list at startup ([`TreeStore::restore`]).

pub mod error;
mod invariants;
pub mod mutation;
pub mod node;
mod order;
pub mod restore;
pub mod snapshot;
pub mod store;
pub mod unread;
mod views;

pub use error::{Result, TreeError};
pub use node::{InsertPosition, Node, Placement, Relation, View, WindowState};
pub use restore::RestoreReport;
pub use snapshot::{NodeRecord, SNAPSHOT_VERSION, TreeSnapshot, WindowSnapshot};
pub use store::TreeStore;
pub use unread::UnreadTracker;
