//! Backend object-storage capability for the objectfs virtual filesystem.
//!
//! The backend exposes only a flat key namespace with list/get/put/copy/delete
//! primitives and marker-based pagination; everything hierarchical is imposed
//! on top of it by the `objectfs-vfs` crate. The `ObjectStore` trait here is
//! the seam between the two: production deployments plug in a real service
//! client, tests use [`MemoryObjectStore`].

mod error;
mod memory;
mod traits;

pub use error::StorageError;
pub use memory::MemoryObjectStore;
pub use traits::{ObjectMetadata, ObjectPage, ObjectStore, ObjectSummary};
