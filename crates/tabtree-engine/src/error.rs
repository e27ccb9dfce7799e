use tabtree_core::TreeError;
use tabtree_types::{NativeError, StorageError};
use thiserror::Error;

/// Errors surfaced by the engine to UI callers and the binary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Native API error: {0}")]
    Native(#[from] NativeError),

    /// Storage write or read failed. Never fatal; the in-memory tree stays authoritative.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] tabtree_config::ConfigError),

    #[error("Engine has stopped")]
    Closed,
}

pub type Result<T> = std::result::Result<T, EngineError>;
