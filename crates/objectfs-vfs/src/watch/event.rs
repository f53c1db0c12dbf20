//! Change events produced by the polling watch engine.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::path::VirtualPath;

/// What happened to an object between two polling cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The key appeared.
    Created,
    /// The key's content fingerprint changed.
    Modified,
    /// The key disappeared.
    Deleted,
}

/// One observed change, bound to the mount of the watch it is delivered to.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Absolute path of the changed object.
    pub path: VirtualPath,
    /// When the change was observed (Unix epoch milliseconds); observation
    /// time, not the backend's modification time.
    pub timestamp_ms: i64,
}

impl ChangeEvent {
    pub(crate) fn observed_now(kind: ChangeKind, path: VirtualPath) -> Self {
        let timestamp_ms: i64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        ChangeEvent {
            kind,
            path,
            timestamp_ms,
        }
    }

    /// The changed path expressed relative to a watched directory.
    pub fn context(&self, watched: &VirtualPath) -> VirtualPath {
        watched.relativize(&self.path)
    }
}
