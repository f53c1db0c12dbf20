//! The abstract backend capability: a flat key namespace with
//! list/get/put/copy/delete primitives.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageError;

/// Summary of one object from a listing page.
///
/// Pseudo-directory entries produced by delimiter grouping carry the grouped
/// prefix as `key` (always ending in the separator), zero size, and no
/// fingerprint or timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch milliseconds).
    pub last_modified: Option<i64>,
    /// Content fingerprint; changes whenever object content changes.
    pub etag: Option<String>,
}

impl ObjectSummary {
    /// Build a pseudo-directory summary for a grouped prefix.
    pub fn pseudo_directory(prefix: impl Into<String>) -> Self {
        ObjectSummary {
            key: prefix.into(),
            size: 0,
            last_modified: None,
            etag: None,
        }
    }

    /// True if this summary's key is directory-shaped (trailing separator).
    pub fn is_directory(&self) -> bool {
        self.key.ends_with('/')
    }
}

/// Extended object metadata from a head operation.
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    /// Object size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch milliseconds).
    pub last_modified: Option<i64>,
    /// Content type.
    pub content_type: Option<String>,
    /// Content fingerprint.
    pub etag: Option<String>,
    /// User-defined metadata.
    pub user_metadata: HashMap<String, String>,
}

/// One page of a marker-paginated prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    /// Real objects in this page, in backend order.
    pub objects: Vec<ObjectSummary>,
    /// Grouped first-level sub-prefixes (only when a delimiter was given).
    pub common_prefixes: Vec<String>,
    /// Continuation marker for the next page, if any.
    pub next_marker: Option<String>,
}

/// Low-level object-storage operations, implemented by each backend.
///
/// Each call is a single backend read or write at whatever consistency the
/// backend provides; no coordination is added here.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether an object exists.
    async fn object_exists(&self, container: &str, key: &str) -> Result<bool, StorageError>;

    /// Fetch object metadata (size, last-modified, fingerprint).
    ///
    /// # Returns
    /// None if the object does not exist.
    async fn head_object(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError>;

    /// Download a whole object into memory.
    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Download a whole object to a local file.
    async fn get_object_to_file(
        &self,
        container: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<(), StorageError>;

    /// Upload bytes as the new full value of an object.
    async fn put_object(
        &self,
        container: &str,
        key: &str,
        data: &[u8],
        content_type: Option<&str>,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<(), StorageError>;

    /// Upload a local file as the new full value of an object.
    async fn put_object_from_file(
        &self,
        container: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<(), StorageError>;

    /// Same- or cross-container copy within this client.
    async fn copy_object(
        &self,
        source_container: &str,
        source_key: &str,
        target_container: &str,
        target_key: &str,
    ) -> Result<(), StorageError>;

    /// Delete an object. Deleting an absent key is not an error.
    async fn delete_object(&self, container: &str, key: &str) -> Result<(), StorageError>;

    /// Fetch one listing page under a prefix.
    ///
    /// # Arguments
    /// * `prefix` - Key prefix to list under
    /// * `delimiter` - Optional grouping delimiter for one-level listing
    /// * `marker` - Continuation marker from the previous page
    async fn list_page(
        &self,
        container: &str,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ObjectPage, StorageError>;
}
