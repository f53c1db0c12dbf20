//! Per-container polling task.
//!
//! One task serves every watch whose scope shares a prefix chain with the
//! task's root. The root is the lexicographically smallest scope (the chain
//! property makes that the broadest ancestor); adding a broader scope widens
//! the root, which the next cycle picks up. Each cycle lists everything under
//! the root, diffs against the previous snapshot, and hands the resulting
//! events to the registry for routing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use objectfs_storage::{ObjectPage, ObjectSummary};

use crate::error::VfsError;
use crate::mount::MountPoint;
use crate::names;
use crate::watch::event::ChangeKind;
use crate::watch::registry::WatchRegistry;

/// Fingerprint of one object for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ObjectState {
    size: u64,
    last_modified: Option<i64>,
    etag: Option<String>,
}

impl ObjectState {
    /// Whether the content changed relative to a previous observation.
    ///
    /// The fingerprint alone decides when the backend supplies one, so a
    /// rewrite with identical content (same etag, fresh timestamp) is not a
    /// modification. Size and timestamp are only consulted as a fallback for
    /// backends without fingerprints.
    fn content_changed(&self, prev: &Self) -> bool {
        match (&self.etag, &prev.etag) {
            (Some(curr_etag), Some(prev_etag)) => curr_etag != prev_etag,
            _ => self.size != prev.size || self.last_modified != prev.last_modified,
        }
    }
}

impl From<&ObjectSummary> for ObjectState {
    fn from(summary: &ObjectSummary) -> Self {
        ObjectState {
            size: summary.size,
            last_modified: summary.last_modified,
            etag: summary.etag.clone(),
        }
    }
}

pub(crate) type Snapshot = BTreeMap<String, ObjectState>;

/// Diff two consecutive snapshots into change events.
///
/// When the scanned root widened between the cycles, keys that merely became
/// visible are not creations, and keys that merely fell out of scope are not
/// deletions; the root guards filter both.
pub(crate) fn diff_snapshots(
    prev_root: &str,
    prev: &Snapshot,
    curr_root: &str,
    curr: &Snapshot,
) -> Vec<(ChangeKind, String)> {
    let mut events: Vec<(ChangeKind, String)> = Vec::new();
    let root_changed: bool = prev_root != curr_root;

    for (key, state) in curr {
        match prev.get(key) {
            None => {
                if !root_changed || key.starts_with(prev_root) {
                    events.push((ChangeKind::Created, key.clone()));
                }
            }
            Some(previous) if state.content_changed(previous) => {
                events.push((ChangeKind::Modified, key.clone()));
            }
            Some(_) => {}
        }
    }
    for key in prev.keys() {
        if !curr.contains_key(key) && key.starts_with(curr_root) {
            events.push((ChangeKind::Deleted, key.clone()));
        }
    }
    events
}

/// Polling task for one container.
pub(crate) struct PollTask {
    registry: Weak<WatchRegistry>,
    mount: Arc<MountPoint>,
    scopes: Mutex<BTreeSet<String>>,
    snapshot: Mutex<Option<(String, Snapshot)>>,
    cancel: CancellationToken,
    interval: Duration,
}

impl PollTask {
    pub(crate) fn new(
        registry: Weak<WatchRegistry>,
        mount: Arc<MountPoint>,
        initial_scope: String,
    ) -> Self {
        let interval: Duration = mount.watch_interval();
        PollTask {
            registry,
            mount,
            scopes: Mutex::new(BTreeSet::from([initial_scope])),
            snapshot: Mutex::new(None),
            cancel: CancellationToken::new(),
            interval,
        }
    }

    /// URI of the container this task polls.
    pub(crate) fn handle_uri(&self) -> &str {
        self.mount.handle().uri()
    }

    /// True if the scope keeps a prefix chain with the task's current root.
    pub(crate) fn accepts(&self, scope: &str) -> bool {
        match self.root_key() {
            Some(root) => scope.starts_with(&root) || root.starts_with(scope),
            None => false,
        }
    }

    pub(crate) fn add_scope(&self, scope: String) {
        self.scopes.lock().insert(scope);
    }

    /// Remove a scope. Returns true when no scopes remain.
    pub(crate) fn remove_scope(&self, scope: &str) -> bool {
        let mut scopes: parking_lot::MutexGuard<'_, BTreeSet<String>> = self.scopes.lock();
        scopes.remove(scope);
        scopes.is_empty()
    }

    pub(crate) fn has_scope(&self, scope: &str) -> bool {
        self.scopes.lock().contains(scope)
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Directory prefix covering every scope: the smallest scope, widened to
    /// its parent when it is file-shaped.
    fn root_key(&self) -> Option<String> {
        let scopes: parking_lot::MutexGuard<'_, BTreeSet<String>> = self.scopes.lock();
        let first: &String = scopes.iter().next()?;
        if first.is_empty() || first.ends_with('/') {
            Some(first.clone())
        } else {
            Some(names::parent_prefix(first).to_string())
        }
    }

    pub(crate) fn spawn(self: &Arc<Self>) {
        let task: Arc<PollTask> = self.clone();
        tokio::spawn(async move {
            loop {
                task.run_cycle().await;
                tokio::select! {
                    _ = task.cancel.cancelled() => break,
                    _ = tokio::time::sleep(task.interval) => {}
                }
            }
        });
    }

    async fn run_cycle(&self) {
        let Some(registry) = self.registry.upgrade() else {
            self.cancel.cancel();
            return;
        };
        let Some(root) = self.root_key() else {
            return;
        };

        let curr: Snapshot = match self.scan(&root).await {
            Ok(snapshot) => snapshot,
            // A failed poll leaves the previous snapshot in place; the next
            // cycle diffs against it as if this one never ran.
            Err(e) => {
                tracing::warn!(root = %root, error = %e, "watch poll failed");
                return;
            }
        };

        let events: Vec<(ChangeKind, String)> = {
            let mut snapshot = self.snapshot.lock();
            let events: Vec<(ChangeKind, String)> = match snapshot.as_ref() {
                // First cycle establishes the baseline without events.
                None => Vec::new(),
                Some((prev_root, prev)) => diff_snapshots(prev_root, prev, &root, &curr),
            };
            *snapshot = Some((root, curr));
            events
        };

        for (kind, key) in events {
            registry.dispatch(self.handle_uri(), kind, &key);
        }
    }

    async fn scan(&self, root: &str) -> Result<Snapshot, VfsError> {
        let store = self.mount.handle().store();
        let container: &str = self.mount.handle().container();
        let mut snapshot: Snapshot = Snapshot::new();
        let mut marker: Option<String> = None;
        loop {
            let page: ObjectPage = match store
                .list_page(container, root, None, marker.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_not_found() => break,
                Err(e) => return Err(e.into()),
            };
            for object in &page.objects {
                snapshot.insert(object.key.clone(), ObjectState::from(object));
            }
            match page.next_marker {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        Ok(snapshot)
    }
}
