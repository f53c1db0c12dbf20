//! Error types for backend storage operations.

use thiserror::Error;

/// Errors from object-storage backend operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested container or key does not exist.
    ///
    /// Callers on listing, staging, and metadata paths treat this as
    /// "absent/empty" rather than as a failure.
    #[error("object not found: {container}/{key}")]
    NotFound {
        /// Container name.
        container: String,
        /// Object key.
        key: String,
    },

    /// Local IO failure while staging to or from a file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other transport or service failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Build a `NotFound` error for a (container, key) pair.
    pub fn not_found(container: impl Into<String>, key: impl Into<String>) -> Self {
        StorageError::NotFound {
            container: container.into(),
            key: key.into(),
        }
    }

    /// True if this error means the object or container is simply absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
