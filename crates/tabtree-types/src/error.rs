//! Errors reported by native capability providers.

use crate::ids::{TabId, WindowId};

/// Error returned by a [`TabApi`](crate::TabApi) or [`WindowApi`](crate::WindowApi) call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    /// The tab no longer exists (closed while the call was in flight).
    #[error("No tab with id: {0}")]
    TabNotFound(TabId),

    /// The window no longer exists.
    #[error("No window with id: {0}")]
    WindowNotFound(WindowId),

    /// The browser refused the call.
    #[error("Native call rejected: {0}")]
    Rejected(String),
}

impl NativeError {
    /// Whether the error is a race with removal, which callers treat as benign.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            NativeError::TabNotFound(_) | NativeError::WindowNotFound(_)
        )
    }
}

/// Error returned by a [`KeyValueStore`](crate::KeyValueStore).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for native calls.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Result type for storage calls.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_missing() {
        assert!(NativeError::TabNotFound(TabId(1)).is_missing());
        assert!(NativeError::WindowNotFound(WindowId(1)).is_missing());
        assert!(!NativeError::Rejected("nope".into()).is_missing());
    }
}
