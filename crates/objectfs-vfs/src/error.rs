//! Error taxonomy for the virtual filesystem.
//!
//! Four classes of failure:
//! - `Configuration`: fatal at provider startup (unresolvable mount,
//!   malformed property).
//! - `NotFound`: recoverable; listing, staging, and metadata paths treat it
//!   as "absent/empty".
//! - `Storage` / `Io`: transport or service failures, propagated synchronously
//!   on direct CRUD paths and swallowed-and-retried on polling paths.
//! - `NotDirectory` / `NotFile` / `AlreadyCancelled` / `IllegalUsage`:
//!   synchronous misuse of the API.

use thiserror::Error;

use objectfs_storage::StorageError;

/// Errors from virtual filesystem operations.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Malformed or incomplete configuration; fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No object or mount exists at the given location.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation requires a directory-shaped path.
    #[error("not a directory: {0}")]
    NotDirectory(String),

    /// The operation requires a file-shaped path.
    #[error("not a file: {0}")]
    NotFile(String),

    /// The watch key was already cancelled.
    #[error("watch key already cancelled")]
    AlreadyCancelled,

    /// Other synchronous API misuse.
    #[error("illegal usage: {0}")]
    IllegalUsage(String),

    /// Backend storage failure.
    #[error(transparent)]
    Storage(StorageError),

    /// Local IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for VfsError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { container, key } => {
                VfsError::NotFound(format!("{}/{}", container, key))
            }
            other => VfsError::Storage(other),
        }
    }
}

impl VfsError {
    /// True if this error means the target is simply absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}
