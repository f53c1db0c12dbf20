//! Watch keys: per-registration event accumulators.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::path::VirtualPath;
use crate::watch::event::ChangeEvent;

/// Handle for one watch registration.
///
/// Events accumulate on the key between polls; the key enters the dispatch
/// queue at most once until its pending events are drained. Cancelling the
/// key stops further delivery.
pub struct WatchKey {
    watchable: VirtualPath,
    valid: AtomicBool,
    queued: AtomicBool,
    events: Mutex<Vec<ChangeEvent>>,
}

impl WatchKey {
    pub(crate) fn new(watchable: VirtualPath) -> Self {
        WatchKey {
            watchable,
            valid: AtomicBool::new(true),
            queued: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        }
    }

    /// The directory this key watches.
    pub fn watchable(&self) -> &VirtualPath {
        &self.watchable
    }

    /// False once the key has been cancelled.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Drain the pending events, oldest first.
    pub fn poll_events(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Invalidate the key. Returns false if it was already invalid.
    pub(crate) fn invalidate(&self) -> bool {
        self.valid
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Append an event. Returns true when the key should (re)enter the
    /// dispatch queue, i.e. it was not already queued.
    pub(crate) fn enqueue(&self, event: ChangeEvent) -> bool {
        if !self.is_valid() {
            return false;
        }
        self.events.lock().push(event);
        self.queued
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Allow the key to be queued again after it was handed to a consumer.
    pub(crate) fn clear_queued(&self) {
        self.queued.store(false, Ordering::Release);
    }
}
