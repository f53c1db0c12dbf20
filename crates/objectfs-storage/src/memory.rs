//! In-memory object store for tests and local development.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StorageError;
use crate::traits::{ObjectMetadata, ObjectPage, ObjectStore, ObjectSummary};

/// One stored object.
#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
    last_modified: i64,
    content_type: Option<String>,
    user_metadata: HashMap<String, String>,
}

impl StoredObject {
    fn new(
        data: Vec<u8>,
        content_type: Option<&str>,
        user_metadata: Option<&HashMap<String, String>>,
    ) -> Self {
        let etag: String = fingerprint(&data);
        StoredObject {
            data,
            etag,
            last_modified: now_millis(),
            content_type: content_type.map(str::to_string),
            user_metadata: user_metadata.cloned().unwrap_or_default(),
        }
    }

    fn summary(&self, key: &str) -> ObjectSummary {
        ObjectSummary {
            key: key.to_string(),
            size: self.data.len() as u64,
            last_modified: Some(self.last_modified),
            etag: Some(self.etag.clone()),
        }
    }
}

/// Content fingerprint for change detection; only needs to change when the
/// content changes.
fn fingerprint(data: &[u8]) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// In-memory `ObjectStore` backed by sorted per-container key maps.
///
/// Listing honors prefix, delimiter grouping, marker continuation, and a
/// configurable page size, so cursor pagination can be exercised in tests
/// without a network backend.
pub struct MemoryObjectStore {
    containers: RwLock<HashMap<String, std::collections::BTreeMap<String, StoredObject>>>,
    page_size: usize,
}

impl MemoryObjectStore {
    /// Create a store with the default page size of 1000 keys.
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    /// Create a store with a specific listing page size.
    pub fn with_page_size(page_size: usize) -> Self {
        MemoryObjectStore {
            containers: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Create a container if it does not already exist.
    pub fn create_container(&self, container: &str) {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default();
    }

    /// Number of keys currently stored in a container.
    pub fn key_count(&self, container: &str) -> usize {
        self.containers
            .read()
            .get(container)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn object_exists(&self, container: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self
            .containers
            .read()
            .get(container)
            .is_some_and(|c| c.contains_key(key)))
    }

    async fn head_object(
        &self,
        container: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StorageError> {
        let containers = self.containers.read();
        let Some(objects) = containers.get(container) else {
            return Ok(None);
        };
        Ok(objects.get(key).map(|o| ObjectMetadata {
            size: o.data.len() as u64,
            last_modified: Some(o.last_modified),
            content_type: o.content_type.clone(),
            etag: Some(o.etag.clone()),
            user_metadata: o.user_metadata.clone(),
        }))
    }

    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.containers
            .read()
            .get(container)
            .and_then(|c| c.get(key))
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::not_found(container, key))
    }

    async fn get_object_to_file(
        &self,
        container: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<(), StorageError> {
        let data: Vec<u8> = self.get_object(container, key).await?;
        std::fs::write(file_path, data)?;
        Ok(())
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        data: &[u8],
        content_type: Option<&str>,
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<(), StorageError> {
        self.containers
            .write()
            .entry(container.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject::new(data.to_vec(), content_type, metadata),
            );
        Ok(())
    }

    async fn put_object_from_file(
        &self,
        container: &str,
        key: &str,
        file_path: &Path,
    ) -> Result<(), StorageError> {
        let data: Vec<u8> = std::fs::read(file_path)?;
        self.put_object(container, key, &data, None, None).await
    }

    async fn copy_object(
        &self,
        source_container: &str,
        source_key: &str,
        target_container: &str,
        target_key: &str,
    ) -> Result<(), StorageError> {
        let mut containers = self.containers.write();
        let source: StoredObject = containers
            .get(source_container)
            .and_then(|c| c.get(source_key))
            .cloned()
            .ok_or_else(|| StorageError::not_found(source_container, source_key))?;
        containers
            .entry(target_container.to_string())
            .or_default()
            .insert(target_key.to_string(), source);
        Ok(())
    }

    async fn delete_object(&self, container: &str, key: &str) -> Result<(), StorageError> {
        if let Some(objects) = self.containers.write().get_mut(container) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn list_page(
        &self,
        container: &str,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ObjectPage, StorageError> {
        let containers = self.containers.read();
        let Some(objects) = containers.get(container) else {
            return Err(StorageError::not_found(container, prefix));
        };

        let mut page = ObjectPage::default();
        let mut seen_prefixes: Vec<String> = Vec::new();
        let mut count: usize = 0;
        let mut last_key: Option<&str> = None;
        let mut truncated: bool = false;

        for (key, object) in objects.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if marker.is_some_and(|m| key.as_str() <= m) {
                continue;
            }

            let grouped: Option<String> = delimiter.and_then(|d| {
                key[prefix.len()..]
                    .find(d)
                    .map(|i| key[..prefix.len() + i + d.len()].to_string())
            });
            // A grouped prefix counts once toward the page size and is never
            // split across pages; the page only truncates at a key that would
            // start a new entry.
            let new_entry: bool = match &grouped {
                Some(common) => !seen_prefixes.contains(common),
                None => true,
            };
            if new_entry && count >= self.page_size {
                truncated = true;
                break;
            }
            match grouped {
                Some(common) => {
                    if new_entry {
                        seen_prefixes.push(common);
                        count += 1;
                    }
                }
                None => {
                    page.objects.push(object.summary(key));
                    count += 1;
                }
            }
            last_key = Some(key);
        }

        page.common_prefixes = seen_prefixes;
        if truncated {
            page.next_marker = last_key.map(str::to_string);
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryObjectStore {
        let store: MemoryObjectStore = MemoryObjectStore::with_page_size(2);
        for key in ["a/1", "a/2", "a/b/3", "a/b/4", "c/5"] {
            store.put_object("bucket", key, b"data", None, None).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_head_and_exists() {
        let store: MemoryObjectStore = seeded().await;
        assert!(store.object_exists("bucket", "a/1").await.unwrap());
        assert!(!store.object_exists("bucket", "missing").await.unwrap());

        let meta: ObjectMetadata = store.head_object("bucket", "a/1").await.unwrap().unwrap();
        assert_eq!(meta.size, 4);
        assert!(meta.etag.is_some());
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let store: MemoryObjectStore = seeded().await;
        let err: StorageError = store.get_object("bucket", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_etag_changes_with_content() {
        let store: MemoryObjectStore = MemoryObjectStore::new();
        store.put_object("b", "k", b"one", None, None).await.unwrap();
        let first: ObjectMetadata = store.head_object("b", "k").await.unwrap().unwrap();
        store.put_object("b", "k", b"two", None, None).await.unwrap();
        let second: ObjectMetadata = store.head_object("b", "k").await.unwrap().unwrap();
        assert_ne!(first.etag, second.etag);
    }

    #[tokio::test]
    async fn test_copy_and_delete() {
        let store: MemoryObjectStore = seeded().await;
        store.copy_object("bucket", "a/1", "bucket", "d/1").await.unwrap();
        assert_eq!(store.get_object("bucket", "d/1").await.unwrap(), b"data");

        store.delete_object("bucket", "a/1").await.unwrap();
        assert!(!store.object_exists("bucket", "a/1").await.unwrap());
        // Deleting an absent key is not an error.
        store.delete_object("bucket", "a/1").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let store: MemoryObjectStore = seeded().await;
        let first: ObjectPage = store.list_page("bucket", "a/", None, None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert!(first.next_marker.is_some());

        let second: ObjectPage = store
            .list_page("bucket", "a/", None, first.next_marker.as_deref())
            .await
            .unwrap();
        assert_eq!(second.objects.len(), 2);
        assert!(second.next_marker.is_none());
    }

    #[tokio::test]
    async fn test_list_grouped() {
        let store: MemoryObjectStore = MemoryObjectStore::new();
        for key in ["a/1", "a/2", "a/b/3", "a/b/4", "a/c/5"] {
            store.put_object("bucket", key, b"x", None, None).await.unwrap();
        }
        let page: ObjectPage = store.list_page("bucket", "a/", Some("/"), None).await.unwrap();
        assert_eq!(page.common_prefixes, vec!["a/b/".to_string(), "a/c/".to_string()]);
        assert_eq!(page.objects.len(), 2);
    }

    #[tokio::test]
    async fn test_file_staging_roundtrip() {
        let store: MemoryObjectStore = MemoryObjectStore::new();
        let staging: tempfile::NamedTempFile = tempfile::NamedTempFile::new().unwrap();

        std::fs::write(staging.path(), b"uploaded from disk").unwrap();
        store
            .put_object_from_file("bucket", "staged.bin", staging.path())
            .await
            .unwrap();

        store
            .get_object_to_file("bucket", "staged.bin", staging.path())
            .await
            .unwrap();
        assert_eq!(std::fs::read(staging.path()).unwrap(), b"uploaded from disk");

        let err: StorageError = store
            .get_object_to_file("bucket", "missing", staging.path())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_grouped_prefix_never_splits_across_pages() {
        let store: MemoryObjectStore = MemoryObjectStore::with_page_size(1);
        for key in ["a/b/1", "a/b/2", "a/c.txt"] {
            store.put_object("bucket", key, b"x", None, None).await.unwrap();
        }
        let first: ObjectPage = store.list_page("bucket", "a/", Some("/"), None).await.unwrap();
        assert_eq!(first.common_prefixes, vec!["a/b/".to_string()]);
        assert!(first.objects.is_empty());

        let second: ObjectPage = store
            .list_page("bucket", "a/", Some("/"), first.next_marker.as_deref())
            .await
            .unwrap();
        assert!(second.common_prefixes.is_empty());
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].key, "a/c.txt");
        assert!(second.next_marker.is_none());
    }

    #[tokio::test]
    async fn test_list_missing_container() {
        let store: MemoryObjectStore = MemoryObjectStore::new();
        let err: StorageError = store.list_page("nope", "", None, None).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
