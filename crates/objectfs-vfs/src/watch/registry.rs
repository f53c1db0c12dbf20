//! Watch registry: registration, routing, and consumption of change events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::VfsError;
use crate::path::VirtualPath;
use crate::watch::event::{ChangeEvent, ChangeKind};
use crate::watch::key::WatchKey;
use crate::watch::queue::DispatchQueue;
use crate::watch::task::PollTask;

/// Callback listener; returning false unregisters it.
type ListenerFn = Box<dyn Fn(&ChangeEvent) -> bool + Send + Sync>;

struct Listener {
    path: VirtualPath,
    callback: ListenerFn,
}

#[derive(Clone)]
enum Subscriber {
    Key(Arc<WatchKey>),
    Listener(Arc<Listener>),
}

#[derive(Default)]
struct RegistryState {
    tasks: Vec<Arc<PollTask>>,
    /// Subscribers keyed by canonical watch URI.
    subscribers: HashMap<String, Vec<Subscriber>>,
}

/// Change-notification service over polling tasks.
///
/// Registrations on the same container share one polling task as long as
/// their scopes form a prefix chain; the task's scan root is the broadest
/// scope. Events are routed to every subscriber whose scope is the changed
/// key itself or one of its directory ancestors. Keys with pending events
/// surface through [`take`](WatchRegistry::take) / [`poll`](WatchRegistry::poll);
/// callback listeners are invoked on their own spawned tasks.
pub struct WatchRegistry {
    state: Mutex<RegistryState>,
    queue: DispatchQueue,
    closed: AtomicBool,
}

impl WatchRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(WatchRegistry {
            state: Mutex::new(RegistryState::default()),
            queue: DispatchQueue::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Register a watch on a directory.
    ///
    /// # Returns
    /// The key through which this registration's events are consumed.
    pub fn register(self: &Arc<Self>, directory: &VirtualPath) -> Result<Arc<WatchKey>, VfsError> {
        self.ensure_open()?;
        if !directory.is_directory() {
            return Err(VfsError::NotDirectory(directory.descriptor().to_string()));
        }
        let scope: String = object_key_of(directory)?;
        let key: Arc<WatchKey> = Arc::new(WatchKey::new(directory.clone()));

        let mut state = self.state.lock();
        self.watch_locked(&mut state, directory, scope.clone());
        state
            .subscribers
            .entry(watch_uri(directory, &scope))
            .or_default()
            .push(Subscriber::Key(key.clone()));
        Ok(key)
    }

    /// Register a callback listener on a directory or a single file.
    ///
    /// The callback runs on a spawned task for every routed event; when it
    /// returns false the listener is unregistered (and its polling task torn
    /// down once nothing else needs it).
    pub fn register_listener<F>(self: &Arc<Self>, path: &VirtualPath, callback: F) -> Result<(), VfsError>
    where
        F: Fn(&ChangeEvent) -> bool + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let scope: String = object_key_of(path)?;
        let listener: Arc<Listener> = Arc::new(Listener {
            path: path.clone(),
            callback: Box::new(callback),
        });

        let mut state = self.state.lock();
        self.watch_locked(&mut state, path, scope.clone());
        state
            .subscribers
            .entry(watch_uri(path, &scope))
            .or_default()
            .push(Subscriber::Listener(listener));
        Ok(())
    }

    /// Cancel a watch key.
    ///
    /// # Returns
    /// `VfsError::AlreadyCancelled` on a second cancellation of the same key.
    pub fn cancel(&self, key: &Arc<WatchKey>) -> Result<(), VfsError> {
        if !key.invalidate() {
            return Err(VfsError::AlreadyCancelled);
        }
        let scope: String = object_key_of(key.watchable())?;
        let uri: String = watch_uri(key.watchable(), &scope);

        let mut state = self.state.lock();
        let emptied: bool = match state.subscribers.get_mut(&uri) {
            Some(subs) => {
                subs.retain(|s| !matches!(s, Subscriber::Key(k) if Arc::ptr_eq(k, key)));
                subs.is_empty()
            }
            None => false,
        };
        if emptied {
            state.subscribers.remove(&uri);
            unwatch_locked(&mut state, key.watchable(), &scope);
        }
        Ok(())
    }

    /// Wait for the next key with pending events.
    pub async fn take(&self) -> Result<Arc<WatchKey>, VfsError> {
        match self.queue.take().await {
            Some(key) => Ok(key),
            None => Err(VfsError::IllegalUsage("watch registry closed".to_string())),
        }
    }

    /// Next key with pending events, if one is already signalled.
    pub fn poll(&self) -> Option<Arc<WatchKey>> {
        self.queue.poll()
    }

    /// Wait up to `limit` for a key with pending events.
    pub async fn poll_timeout(&self, limit: std::time::Duration) -> Result<Option<Arc<WatchKey>>, VfsError> {
        match tokio::time::timeout(limit, self.take()).await {
            Ok(key) => key.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }

    /// Number of live polling tasks.
    pub fn active_task_count(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Stop every polling task, invalidate every key, and wake every waiter.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock();
        for task in state.tasks.drain(..) {
            task.cancel();
        }
        for subs in state.subscribers.values() {
            for sub in subs {
                if let Subscriber::Key(key) = sub {
                    key.invalidate();
                }
            }
        }
        state.subscribers.clear();
        drop(state);
        self.queue.close();
    }

    /// Route one observed change to every covering subscriber.
    ///
    /// A subscriber is covered when its scope equals the changed key or is a
    /// directory ancestor of it. Callback listeners run on their own spawned
    /// task, so a slow callback never stalls the polling cycle or delays the
    /// other subscribers.
    pub(crate) fn dispatch(self: &Arc<Self>, handle_uri: &str, kind: ChangeKind, key: &str) {
        let event_uri: String = format!("{}/{}", handle_uri, key);
        let recipients: Vec<Subscriber> = {
            let state = self.state.lock();
            state
                .subscribers
                .iter()
                .filter(|(scope_uri, _)| scope_covers(scope_uri, &event_uri))
                .flat_map(|(_, subs)| subs.iter().cloned())
                .collect()
        };

        for subscriber in recipients {
            match subscriber {
                Subscriber::Key(watch_key) => {
                    let event: ChangeEvent = rebind(kind, key, watch_key.watchable());
                    if watch_key.enqueue(event) {
                        self.queue.push(watch_key);
                    }
                }
                Subscriber::Listener(listener) => {
                    let event: ChangeEvent = rebind(kind, key, &listener.path);
                    let registry: Arc<WatchRegistry> = self.clone();
                    tokio::spawn(async move {
                        if !(listener.callback)(&event) {
                            registry.remove_listener(&listener);
                        }
                    });
                }
            }
        }
    }

    fn remove_listener(&self, listener: &Arc<Listener>) {
        let Ok(scope) = object_key_of(&listener.path) else {
            return;
        };
        let uri: String = watch_uri(&listener.path, &scope);
        let mut state = self.state.lock();
        let emptied: bool = match state.subscribers.get_mut(&uri) {
            Some(subs) => {
                subs.retain(|s| !matches!(s, Subscriber::Listener(l) if Arc::ptr_eq(l, listener)));
                subs.is_empty()
            }
            None => false,
        };
        if emptied {
            state.subscribers.remove(&uri);
            unwatch_locked(&mut state, &listener.path, &scope);
        }
    }

    fn watch_locked(self: &Arc<Self>, state: &mut RegistryState, path: &VirtualPath, scope: String) {
        let handle_uri: &str = path.mount().handle().uri();
        if let Some(task) = state
            .tasks
            .iter()
            .find(|t| t.handle_uri() == handle_uri && t.accepts(&scope))
        {
            task.add_scope(scope);
            return;
        }
        let task: Arc<PollTask> = Arc::new(PollTask::new(
            Arc::downgrade(self),
            path.mount().clone(),
            scope,
        ));
        task.spawn();
        state.tasks.push(task);
    }

    fn ensure_open(&self) -> Result<(), VfsError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VfsError::IllegalUsage("watch registry closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

fn unwatch_locked(state: &mut RegistryState, path: &VirtualPath, scope: &str) {
    let handle_uri: &str = path.mount().handle().uri();
    state.tasks.retain(|task| {
        if task.handle_uri() == handle_uri && task.has_scope(scope) && task.remove_scope(scope) {
            task.cancel();
            return false;
        }
        true
    });
}

fn object_key_of(path: &VirtualPath) -> Result<String, VfsError> {
    path.object_key()
        .map(str::to_string)
        .ok_or_else(|| VfsError::IllegalUsage("cannot watch a relative path".to_string()))
}

fn watch_uri(path: &VirtualPath, scope: &str) -> String {
    format!("{}/{}", path.mount().handle().uri(), scope)
}

fn scope_covers(scope_uri: &str, event_uri: &str) -> bool {
    (scope_uri.ends_with('/') && event_uri.starts_with(scope_uri)) || scope_uri == event_uri
}

fn rebind(kind: ChangeKind, key: &str, watchable: &VirtualPath) -> ChangeEvent {
    ChangeEvent::observed_now(
        kind,
        VirtualPath::new(watchable.mount().clone(), format!("/{}", key)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::{ContainerHandle, MountPoint};
    use objectfs_storage::MemoryObjectStore;
    use std::time::Duration;

    fn mounted(interval_ms: u64) -> Arc<MountPoint> {
        let handle: Arc<ContainerHandle> = Arc::new(ContainerHandle::new(
            Arc::new(MemoryObjectStore::new()),
            "bucket",
            "storage.example.com",
            None,
            Vec::new(),
        ));
        Arc::new(MountPoint::new(
            handle,
            "data/",
            None,
            Duration::from_millis(interval_ms),
        ))
    }

    #[tokio::test]
    async fn test_register_requires_directory() {
        let registry: Arc<WatchRegistry> = WatchRegistry::new();
        let mount: Arc<MountPoint> = mounted(60_000);
        assert!(matches!(
            registry.register(&mount.path("/file.txt")),
            Err(VfsError::NotDirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_chained_scopes_share_one_task() {
        let registry: Arc<WatchRegistry> = WatchRegistry::new();
        let mount: Arc<MountPoint> = mounted(60_000);

        let outer: Arc<WatchKey> = registry.register(&mount.path("/a/")).unwrap();
        let inner: Arc<WatchKey> = registry.register(&mount.path("/a/b/")).unwrap();
        assert_eq!(registry.active_task_count(), 1);

        // Disjoint scope gets its own task.
        let other: Arc<WatchKey> = registry.register(&mount.path("/z/")).unwrap();
        assert_eq!(registry.active_task_count(), 2);

        registry.cancel(&inner).unwrap();
        assert_eq!(registry.active_task_count(), 2);
        registry.cancel(&outer).unwrap();
        assert_eq!(registry.active_task_count(), 1);
        registry.cancel(&other).unwrap();
        assert_eq!(registry.active_task_count(), 0);
    }

    #[tokio::test]
    async fn test_double_cancel_rejected() {
        let registry: Arc<WatchRegistry> = WatchRegistry::new();
        let mount: Arc<MountPoint> = mounted(60_000);
        let key: Arc<WatchKey> = registry.register(&mount.path("/a/")).unwrap();

        registry.cancel(&key).unwrap();
        assert!(!key.is_valid());
        assert!(matches!(
            registry.cancel(&key),
            Err(VfsError::AlreadyCancelled)
        ));
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_ancestor_scopes_only() {
        let registry: Arc<WatchRegistry> = WatchRegistry::new();
        let mount: Arc<MountPoint> = mounted(60_000);

        let covering: Arc<WatchKey> = registry.register(&mount.path("/a/")).unwrap();
        let sibling: Arc<WatchKey> = registry.register(&mount.path("/a/other/")).unwrap();

        registry.dispatch(
            mount.handle().uri(),
            ChangeKind::Created,
            "data/a/sub/file.txt",
        );

        let signalled: Arc<WatchKey> = registry.take().await.unwrap();
        assert!(Arc::ptr_eq(&signalled, &covering));
        let events: Vec<ChangeEvent> = signalled.poll_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Created);
        assert_eq!(events[0].path.descriptor(), "/data/a/sub/file.txt");
        assert!(sibling.poll_events().is_empty());
        assert!(registry.poll().is_none());
    }

    #[tokio::test]
    async fn test_key_queued_once_until_drained() {
        let registry: Arc<WatchRegistry> = WatchRegistry::new();
        let mount: Arc<MountPoint> = mounted(60_000);
        let key: Arc<WatchKey> = registry.register(&mount.path("/a/")).unwrap();

        registry.dispatch(mount.handle().uri(), ChangeKind::Created, "data/a/x");
        registry.dispatch(mount.handle().uri(), ChangeKind::Created, "data/a/y");

        let signalled: Arc<WatchKey> = registry.poll().unwrap();
        assert!(Arc::ptr_eq(&signalled, &key));
        assert_eq!(signalled.poll_events().len(), 2);
        // Both events coalesced onto one queue entry.
        assert!(registry.poll().is_none());
    }

    async fn settle(condition: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_listener_unregisters_on_false() {
        let registry: Arc<WatchRegistry> = WatchRegistry::new();
        let mount: Arc<MountPoint> = mounted(60_000);

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: Arc<Mutex<Vec<String>>> = seen.clone();
        registry
            .register_listener(&mount.path("/a/target.txt"), move |event| {
                sink.lock().push(event.path.descriptor().to_string());
                false
            })
            .unwrap();
        assert_eq!(registry.active_task_count(), 1);

        registry.dispatch(mount.handle().uri(), ChangeKind::Modified, "data/a/target.txt");
        // Delivery and the false-return teardown happen off the dispatching
        // task.
        let torn_down: bool = settle(|| {
            seen.lock().len() == 1 && registry.active_task_count() == 0
        })
        .await;
        assert!(torn_down);
        assert_eq!(seen.lock().as_slice(), ["/data/a/target.txt"]);

        // Unregistered: further events are dropped.
        registry.dispatch(mount.handle().uri(), ChangeKind::Deleted, "data/a/target.txt");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocked_listener_does_not_stall_dispatch() {
        let registry: Arc<WatchRegistry> = WatchRegistry::new();
        let mount: Arc<MountPoint> = mounted(60_000);

        let key: Arc<WatchKey> = registry.register(&mount.path("/a/")).unwrap();
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let gate: Mutex<std::sync::mpsc::Receiver<()>> = Mutex::new(gate);
        let finished: Arc<Mutex<bool>> = Arc::new(Mutex::new(false));
        let finished_flag: Arc<Mutex<bool>> = finished.clone();
        registry
            .register_listener(&mount.path("/a/"), move |_event| {
                let _ = gate.lock().recv();
                *finished_flag.lock() = true;
                true
            })
            .unwrap();

        // The callback blocks on the gate, yet dispatch returns and the
        // queued key is already consumable.
        registry.dispatch(mount.handle().uri(), ChangeKind::Created, "data/a/x");
        let signalled: Arc<WatchKey> = registry.poll().unwrap();
        assert!(Arc::ptr_eq(&signalled, &key));
        assert_eq!(signalled.poll_events().len(), 1);
        assert!(!*finished.lock());

        release.send(()).unwrap();
        assert!(settle(|| *finished.lock()).await);
    }

    #[tokio::test]
    async fn test_take_unblocks_on_close() {
        let registry: Arc<WatchRegistry> = WatchRegistry::new();
        let mount: Arc<MountPoint> = mounted(60_000);
        let key: Arc<WatchKey> = registry.register(&mount.path("/a/")).unwrap();

        let waiter: tokio::task::JoinHandle<Result<Arc<WatchKey>, VfsError>> = {
            let registry: Arc<WatchRegistry> = registry.clone();
            tokio::spawn(async move { registry.take().await })
        };
        tokio::task::yield_now().await;
        registry.close();

        assert!(waiter.await.unwrap().is_err());
        assert!(!key.is_valid());
        assert!(registry.register(&mount.path("/b/")).is_err());
    }
}
