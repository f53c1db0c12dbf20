//! Hierarchical-filesystem semantics over a flat object-storage backend.
//!
//! The backend (see `objectfs-storage`) only knows keys, bytes, and
//! marker-paginated prefix listings. This crate layers a filesystem on top:
//!
//! - [`config`]: flat `group.key = value` properties describing mounts.
//! - [`mount`]: containers, mount points, and longest-prefix URI resolution.
//! - [`path`] / [`names`]: virtual paths and their descriptor algebra.
//! - [`listing`]: lazy directory cursors over paginated listings.
//! - [`channel`]: random-access file channels staged through temp files.
//! - [`watch`]: polling-based change notification.
//! - [`provider`]: the facade wiring it all together.
//!
//! Directories are purely syntactic: a trailing `/` on a key makes it
//! directory-shaped, and nothing checks that a "file" key is not also a
//! prefix of other keys. The backend is the single source of truth; nothing
//! is cached, so every read observes whatever consistency the backend gives.

pub mod channel;
pub mod config;
pub mod error;
pub mod listing;
pub mod mount;
pub mod names;
pub mod path;
pub mod provider;
pub mod watch;

pub use channel::StagedChannel;
pub use config::{MountConfig, PropertySet};
pub use error::VfsError;
pub use listing::{ListEntry, ListingCursor};
pub use mount::{ContainerHandle, MountPoint, MountTable};
pub use path::VirtualPath;
pub use provider::{ObjectStoreFactory, ProviderOptions, VfsProvider};
pub use watch::{ChangeEvent, ChangeKind, WatchKey, WatchRegistry};
