//! Queue of signalled watch keys.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::watch::key::WatchKey;

/// FIFO of keys with pending events.
///
/// A key is queued at most once; [`WatchKey::enqueue`] reports whether the
/// push is needed, and popping re-arms the key for the next event.
#[derive(Default)]
pub(crate) struct DispatchQueue {
    queue: Mutex<VecDeque<Arc<WatchKey>>>,
    notify: Notify,
    closed: AtomicBool,
}

impl DispatchQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, key: Arc<WatchKey>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.queue.lock().push_back(key);
        self.notify.notify_one();
    }

    /// Pop the next signalled key without waiting.
    pub(crate) fn poll(&self) -> Option<Arc<WatchKey>> {
        let key: Option<Arc<WatchKey>> = self.queue.lock().pop_front();
        if let Some(key) = &key {
            key.clear_queued();
        }
        key
    }

    /// Wait for the next signalled key.
    ///
    /// # Returns
    /// None once the queue has been closed and drained.
    pub(crate) async fn take(&self) -> Option<Arc<WatchKey>> {
        loop {
            // Arm the wakeup before checking the queue so a push between the
            // check and the await is not lost.
            let notified = self.notify.notified();
            if let Some(key) = self.poll() {
                return Some(key);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Close the queue and wake every waiter.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}
