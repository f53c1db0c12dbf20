//! Polling-based change notification.
//!
//! The backend has no push notifications, so watches are driven by periodic
//! listing: one polling task per container scans the broadest watched prefix
//! each cycle, diffs the result against the previous cycle's snapshot, and
//! routes created/modified/deleted events to the registered watches. Within
//! one cycle every event reflects the same listing pass; a create-then-delete
//! between two cycles is invisible.

mod event;
mod key;
mod queue;
mod registry;
mod task;

pub use event::{ChangeEvent, ChangeKind};
pub use key::WatchKey;
pub use registry::WatchRegistry;
