//! Provider facade: builds the mount table from configuration and exposes
//! the filesystem operations.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;

use objectfs_storage::{ObjectMetadata, ObjectStore};

use crate::channel::StagedChannel;
use crate::config::{MountConfig, PropertySet};
use crate::error::VfsError;
use crate::listing::{ListEntry, ListingCursor};
use crate::mount::{ContainerHandle, MountPoint, MountTable};
use crate::path::VirtualPath;
use crate::watch::{ChangeEvent, WatchKey, WatchRegistry};

/// Builds backend clients from mount configuration.
///
/// The provider deduplicates calls: one client per credential+endpoint pair,
/// however many mounts share it.
pub trait ObjectStoreFactory: Send + Sync {
    fn create(&self, config: &MountConfig) -> Result<Arc<dyn ObjectStore>, VfsError>;
}

/// Provider-wide options.
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    /// Build clients against the alternate/internal endpoint when a mount
    /// configures one. Canonical URIs keep the primary endpoint either way.
    pub prefer_internal_endpoint: bool,
}

/// The virtual filesystem.
///
/// Construction is eager: every mount's client and container handle is built
/// up front, so a misconfigured mount fails at startup rather than on first
/// use. The provider itself is immutable after construction; all mutable
/// state lives behind the watch registry and the backend.
pub struct VfsProvider {
    table: MountTable,
    watch: Arc<WatchRegistry>,
}

impl std::fmt::Debug for VfsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsProvider").finish_non_exhaustive()
    }
}

impl VfsProvider {
    /// Build a provider from flat properties.
    ///
    /// # Arguments
    /// * `properties` - Flat `group.key = value` configuration
    /// * `factory` - Backend client factory
    /// * `options` - Provider-wide options
    pub fn new(
        properties: &PropertySet,
        factory: &dyn ObjectStoreFactory,
        options: ProviderOptions,
    ) -> Result<Self, VfsError> {
        let configs: Vec<MountConfig> = properties.mount_configs()?;
        if configs.is_empty() {
            return Err(VfsError::Configuration("no mounts configured".to_string()));
        }

        let mut clients: HashMap<String, Arc<dyn ObjectStore>> = HashMap::new();
        let mut handles: HashMap<String, Arc<ContainerHandle>> = HashMap::new();
        let mut table: MountTable = MountTable::new();

        for config in &configs {
            let mut effective: MountConfig = config.clone();
            if options.prefer_internal_endpoint {
                if let Some(internal) = &config.endpoint_internal {
                    effective.endpoint = internal.clone();
                }
            }

            let store: Arc<dyn ObjectStore> = match clients.get(&effective.client_key()) {
                Some(store) => store.clone(),
                None => {
                    let store: Arc<dyn ObjectStore> = factory.create(&effective)?;
                    clients.insert(effective.client_key(), store.clone());
                    store
                }
            };

            // First mount of a container wins the handle; later mounts of the
            // same container share it.
            let handle: Arc<ContainerHandle> = match handles.get(&effective.container_key()) {
                Some(handle) => handle.clone(),
                None => {
                    let handle: Arc<ContainerHandle> = Arc::new(ContainerHandle::new(
                        store,
                        config.container.clone(),
                        config.endpoint.clone(),
                        config.endpoint_internal.clone(),
                        config.cname.clone(),
                    ));
                    handles.insert(effective.container_key(), handle.clone());
                    handle
                }
            };

            let mount: Arc<MountPoint> = Arc::new(MountPoint::new(
                handle,
                config.prefix.clone(),
                config.mount_tag.clone(),
                config.watch_interval,
            ));
            tracing::info!(mount = %config.name, uri = %mount.canonical_uri(), "mount configured");
            table.insert(mount);
        }

        Ok(VfsProvider {
            table,
            watch: WatchRegistry::new(),
        })
    }

    /// Resolve a URI against the mount table.
    ///
    /// # Returns
    /// `VfsError::NotFound` when no mount covers the URI.
    pub fn resolve(&self, uri: &str) -> Result<VirtualPath, VfsError> {
        self.table
            .resolve(uri)
            .ok_or_else(|| VfsError::NotFound(uri.to_string()))
    }

    /// The configured mount points.
    pub fn mounts(&self) -> Vec<Arc<MountPoint>> {
        self.table.mounts()
    }

    // ========================================================================
    // Object access
    // ========================================================================

    /// Check whether a path exists.
    ///
    /// A directory exists when its placeholder object exists or anything
    /// lives under its prefix.
    pub async fn exists(&self, path: &VirtualPath) -> Result<bool, VfsError> {
        let (store, container, key) = backend_of(path)?;
        if store.object_exists(container, &key).await? {
            return Ok(true);
        }
        if path.is_file() {
            return Ok(false);
        }
        let mut cursor: ListingCursor = ListingCursor::recursive(path)?;
        Ok(cursor.next().await?.is_some())
    }

    /// Fetch a file's metadata.
    pub async fn metadata(&self, path: &VirtualPath) -> Result<ObjectMetadata, VfsError> {
        if path.is_directory() {
            return Err(VfsError::NotFile(path.descriptor().to_string()));
        }
        let (store, container, key) = backend_of(path)?;
        store
            .head_object(container, &key)
            .await?
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    /// Read a whole file into memory.
    pub async fn read(&self, path: &VirtualPath) -> Result<Vec<u8>, VfsError> {
        if path.is_directory() {
            return Err(VfsError::NotFile(path.descriptor().to_string()));
        }
        let (store, container, key) = backend_of(path)?;
        Ok(store.get_object(container, &key).await?)
    }

    /// Replace a file's content.
    pub async fn write(
        &self,
        path: &VirtualPath,
        data: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), VfsError> {
        if path.is_directory() {
            return Err(VfsError::NotFile(path.descriptor().to_string()));
        }
        let (store, container, key) = backend_of(path)?;
        store
            .put_object(container, &key, data, content_type, None)
            .await?;
        Ok(())
    }

    /// Open a staged random-access channel on an existing file.
    pub async fn open_channel(&self, path: &VirtualPath) -> Result<StagedChannel, VfsError> {
        StagedChannel::open(path).await
    }

    /// Open a staged channel, creating the file if absent.
    pub async fn create_channel(&self, path: &VirtualPath) -> Result<StagedChannel, VfsError> {
        StagedChannel::create(path).await
    }

    // ========================================================================
    // Directory operations
    // ========================================================================

    /// Cursor over a directory's immediate children.
    pub fn list(&self, directory: &VirtualPath) -> Result<ListingCursor, VfsError> {
        ListingCursor::shallow(directory)
    }

    /// Cursor over every file below a directory.
    pub fn list_recursive(&self, directory: &VirtualPath) -> Result<ListingCursor, VfsError> {
        ListingCursor::recursive(directory)
    }

    /// Total size in bytes of the files below a directory.
    pub async fn directory_size(&self, directory: &VirtualPath) -> Result<u64, VfsError> {
        let mut cursor: ListingCursor = ListingCursor::recursive(directory)?;
        let mut total: u64 = 0;
        while let Some(entry) = cursor.next().await? {
            if !entry.is_directory() {
                total += entry.summary.size;
            }
        }
        Ok(total)
    }

    /// Number of files below a directory.
    pub async fn entry_count(&self, directory: &VirtualPath) -> Result<usize, VfsError> {
        let mut cursor: ListingCursor = ListingCursor::recursive(directory)?;
        let mut count: usize = 0;
        while let Some(entry) = cursor.next().await? {
            if !entry.is_directory() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Last-modified timestamp: the file's own, or the newest below a
    /// directory.
    pub async fn last_modified(&self, path: &VirtualPath) -> Result<Option<i64>, VfsError> {
        if path.is_file() {
            return Ok(self.metadata(path).await?.last_modified);
        }
        let mut cursor: ListingCursor = ListingCursor::recursive(path)?;
        let mut newest: Option<i64> = None;
        while let Some(entry) = cursor.next().await? {
            if entry.summary.last_modified > newest {
                newest = entry.summary.last_modified;
            }
        }
        Ok(newest)
    }

    // ========================================================================
    // Copy / move / delete
    // ========================================================================

    /// Copy one file.
    ///
    /// Within one client this is a server-side copy; across clients the
    /// content is downloaded and re-uploaded.
    pub async fn copy(&self, source: &VirtualPath, target: &VirtualPath) -> Result<(), VfsError> {
        let (source_store, source_container, source_key) = backend_of(source)?;
        let (target_store, target_container, target_key) = backend_of(target)?;
        if source.is_directory() || target.is_directory() {
            return Err(VfsError::NotFile(format!("{} -> {}", source, target)));
        }

        if Arc::ptr_eq(source_store, target_store) {
            source_store
                .copy_object(source_container, &source_key, target_container, &target_key)
                .await?;
        } else {
            let metadata: Option<ObjectMetadata> =
                source_store.head_object(source_container, &source_key).await?;
            let content_type: Option<String> = metadata
                .ok_or_else(|| VfsError::NotFound(source.to_string()))?
                .content_type;
            let data: Vec<u8> = source_store.get_object(source_container, &source_key).await?;
            target_store
                .put_object(
                    target_container,
                    &target_key,
                    &data,
                    content_type.as_deref(),
                    None,
                )
                .await?;
        }
        Ok(())
    }

    /// Copy every file below a directory to the same relative location under
    /// another directory.
    pub async fn copy_recursive(
        &self,
        source: &VirtualPath,
        target: &VirtualPath,
    ) -> Result<(), VfsError> {
        if !target.is_directory() {
            return Err(VfsError::NotDirectory(target.descriptor().to_string()));
        }
        let entries: Vec<ListEntry> = ListingCursor::recursive(source)?.collect().await?;
        let copies = entries
            .iter()
            .filter(|entry| !entry.is_directory())
            .map(|entry| {
                let relative: VirtualPath = source.relativize(&entry.path);
                let destination: VirtualPath = target.resolve(relative.descriptor());
                async move { self.copy(&entry.path, &destination).await }
            });
        try_join_all(copies).await?;
        Ok(())
    }

    /// Delete one file. Deleting an absent file is not an error.
    pub async fn delete(&self, path: &VirtualPath) -> Result<(), VfsError> {
        if path.is_directory() {
            return Err(VfsError::NotFile(path.descriptor().to_string()));
        }
        let (store, container, key) = backend_of(path)?;
        store.delete_object(container, &key).await?;
        Ok(())
    }

    /// Delete everything below a directory, placeholders included.
    pub async fn delete_recursive(&self, directory: &VirtualPath) -> Result<(), VfsError> {
        let (store, container, _) = backend_of(directory)?;
        let entries: Vec<ListEntry> = ListingCursor::recursive(directory)?.collect().await?;
        for entry in &entries {
            store.delete_object(container, &entry.summary.key).await?;
        }
        // The directory's own placeholder, if any.
        if let Some(key) = directory.object_key() {
            if !key.is_empty() {
                store.delete_object(container, key).await?;
            }
        }
        Ok(())
    }

    /// Move one file: copy, then delete the source.
    ///
    /// Not atomic; a failure after the copy leaves both objects in place.
    pub async fn move_to(&self, source: &VirtualPath, target: &VirtualPath) -> Result<(), VfsError> {
        self.copy(source, target).await?;
        self.delete(source).await
    }

    /// Move a directory tree: recursive copy, then recursive delete.
    pub async fn move_recursive(
        &self,
        source: &VirtualPath,
        target: &VirtualPath,
    ) -> Result<(), VfsError> {
        self.copy_recursive(source, target).await?;
        self.delete_recursive(source).await
    }

    // ========================================================================
    // Change notification
    // ========================================================================

    /// Watch a directory for changes.
    pub fn watch(&self, directory: &VirtualPath) -> Result<Arc<WatchKey>, VfsError> {
        self.watch.register(directory)
    }

    /// Watch a directory or file with a callback, delivered on spawned tasks.
    pub fn watch_with<F>(&self, path: &VirtualPath, callback: F) -> Result<(), VfsError>
    where
        F: Fn(&ChangeEvent) -> bool + Send + Sync + 'static,
    {
        self.watch.register_listener(path, callback)
    }

    /// Cancel a watch key.
    pub fn cancel(&self, key: &Arc<WatchKey>) -> Result<(), VfsError> {
        self.watch.cancel(key)
    }

    /// Wait for the next watch key with pending events.
    pub async fn take(&self) -> Result<Arc<WatchKey>, VfsError> {
        self.watch.take().await
    }

    /// Next signalled watch key, if any.
    pub fn poll_key(&self) -> Option<Arc<WatchKey>> {
        self.watch.poll()
    }

    /// Wait up to `limit` for a signalled watch key.
    pub async fn poll_key_timeout(
        &self,
        limit: std::time::Duration,
    ) -> Result<Option<Arc<WatchKey>>, VfsError> {
        self.watch.poll_timeout(limit).await
    }

    /// Stop the watch engine. Further operations on the backend still work.
    pub fn shutdown(&self) {
        self.watch.close();
    }
}

impl Drop for VfsProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn backend_of(path: &VirtualPath) -> Result<(&Arc<dyn ObjectStore>, &str, String), VfsError> {
    let key: String = path
        .object_key()
        .ok_or_else(|| VfsError::IllegalUsage("relative path".to_string()))?
        .to_string();
    let handle: &Arc<ContainerHandle> = path.mount().handle();
    Ok((handle.store(), handle.container(), key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use objectfs_storage::MemoryObjectStore;
    use parking_lot::Mutex;

    /// Factory handing out one in-memory backend per endpoint, counting
    /// creations so dedup is observable.
    #[derive(Default)]
    struct MemoryFactory {
        created: Mutex<Vec<String>>,
    }

    impl ObjectStoreFactory for MemoryFactory {
        fn create(&self, config: &MountConfig) -> Result<Arc<dyn ObjectStore>, VfsError> {
            self.created.lock().push(config.endpoint.clone());
            Ok(Arc::new(MemoryObjectStore::new()))
        }
    }

    fn properties(text: &str) -> PropertySet {
        PropertySet::parse(text).unwrap()
    }

    const TWO_MOUNTS: &str = "\
        access-key-id = AKID\n\
        secret-access-key = SECRET\n\
        media.container = bucket\n\
        media.endpoint = storage.example.com\n\
        media.prefix = media\n\
        media.mount = vfs://media/\n\
        docs.container = bucket\n\
        docs.endpoint = storage.example.com\n\
        docs.prefix = docs\n\
        docs.mount = vfs://docs/\n\
    ";

    #[tokio::test]
    async fn test_shared_client_and_container() {
        let factory: MemoryFactory = MemoryFactory::default();
        let provider: VfsProvider =
            VfsProvider::new(&properties(TWO_MOUNTS), &factory, ProviderOptions::default())
                .unwrap();

        // Same credentials and endpoint: one client serves both mounts.
        assert_eq!(factory.created.lock().len(), 1);

        let media: VirtualPath = provider.resolve("vfs://media/a.txt").unwrap();
        let docs: VirtualPath = provider.resolve("vfs://docs/b.txt").unwrap();
        assert!(Arc::ptr_eq(
            media.mount().handle().store(),
            docs.mount().handle().store()
        ));
    }

    #[tokio::test]
    async fn test_prefer_internal_endpoint_builds_separate_client_key() {
        let factory: MemoryFactory = MemoryFactory::default();
        let text: &str = "\
            access-key-id = AKID\n\
            secret-access-key = SECRET\n\
            m.container = bucket\n\
            m.endpoint = storage.example.com\n\
            m.endpoint-internal = internal.example.com\n\
        ";
        let options: ProviderOptions = ProviderOptions {
            prefer_internal_endpoint: true,
        };
        let provider: VfsProvider =
            VfsProvider::new(&properties(text), &factory, options).unwrap();

        assert_eq!(factory.created.lock().as_slice(), ["internal.example.com"]);
        // Canonical URIs keep the primary endpoint.
        let mount: Arc<MountPoint> = provider.mounts().pop().unwrap();
        assert_eq!(
            mount.canonical_uri(),
            "http://bucket.storage.example.com/"
        );
    }

    #[tokio::test]
    async fn test_no_mounts_is_configuration_error() {
        let factory: MemoryFactory = MemoryFactory::default();
        let err: VfsError =
            VfsProvider::new(&PropertySet::new(), &factory, ProviderOptions::default())
                .unwrap_err();
        assert!(matches!(err, VfsError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_write_read_roundtrip_and_metadata() {
        let factory: MemoryFactory = MemoryFactory::default();
        let provider: VfsProvider =
            VfsProvider::new(&properties(TWO_MOUNTS), &factory, ProviderOptions::default())
                .unwrap();
        let path: VirtualPath = provider.resolve("vfs://media/report.txt").unwrap();

        assert!(!provider.exists(&path).await.unwrap());
        provider
            .write(&path, b"quarterly numbers", Some("text/plain"))
            .await
            .unwrap();
        assert!(provider.exists(&path).await.unwrap());
        assert_eq!(provider.read(&path).await.unwrap(), b"quarterly numbers");

        let metadata: ObjectMetadata = provider.metadata(&path).await.unwrap();
        assert_eq!(metadata.size, 17);
        assert_eq!(metadata.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_copy_within_one_client() {
        let factory: MemoryFactory = MemoryFactory::default();
        let provider: VfsProvider =
            VfsProvider::new(&properties(TWO_MOUNTS), &factory, ProviderOptions::default())
                .unwrap();
        let source: VirtualPath = provider.resolve("vfs://media/a.txt").unwrap();
        let target: VirtualPath = provider.resolve("vfs://docs/a.txt").unwrap();

        provider.write(&source, b"payload", None).await.unwrap();
        provider.copy(&source, &target).await.unwrap();
        assert_eq!(provider.read(&target).await.unwrap(), b"payload");
        // Copy leaves the source in place.
        assert_eq!(provider.read(&source).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_move_is_copy_then_delete() {
        let factory: MemoryFactory = MemoryFactory::default();
        let provider: VfsProvider =
            VfsProvider::new(&properties(TWO_MOUNTS), &factory, ProviderOptions::default())
                .unwrap();
        let source: VirtualPath = provider.resolve("vfs://media/a.txt").unwrap();
        let target: VirtualPath = provider.resolve("vfs://media/b.txt").unwrap();

        provider.write(&source, b"payload", None).await.unwrap();
        provider.move_to(&source, &target).await.unwrap();
        assert!(!provider.exists(&source).await.unwrap());
        assert_eq!(provider.read(&target).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_recursive_copy_and_delete() {
        let factory: MemoryFactory = MemoryFactory::default();
        let provider: VfsProvider =
            VfsProvider::new(&properties(TWO_MOUNTS), &factory, ProviderOptions::default())
                .unwrap();
        let source_dir: VirtualPath = provider.resolve("vfs://media/album/").unwrap();
        let target_dir: VirtualPath = provider.resolve("vfs://docs/backup/").unwrap();

        for name in ["one.txt", "sub/two.txt", "sub/deep/three.txt"] {
            let path: VirtualPath = source_dir.resolve(name);
            provider.write(&path, name.as_bytes(), None).await.unwrap();
        }

        provider.copy_recursive(&source_dir, &target_dir).await.unwrap();
        assert_eq!(provider.entry_count(&target_dir).await.unwrap(), 3);
        let copied: VirtualPath = target_dir.resolve("sub/two.txt");
        assert_eq!(provider.read(&copied).await.unwrap(), b"sub/two.txt");

        provider.delete_recursive(&source_dir).await.unwrap();
        assert!(!provider.exists(&source_dir).await.unwrap());
        assert_eq!(provider.entry_count(&source_dir).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_directory_size_and_last_modified() {
        let factory: MemoryFactory = MemoryFactory::default();
        let provider: VfsProvider =
            VfsProvider::new(&properties(TWO_MOUNTS), &factory, ProviderOptions::default())
                .unwrap();
        let dir: VirtualPath = provider.resolve("vfs://media/logs/").unwrap();

        provider.write(&dir.resolve("a"), b"12345", None).await.unwrap();
        provider.write(&dir.resolve("b"), b"123", None).await.unwrap();

        assert_eq!(provider.directory_size(&dir).await.unwrap(), 8);
        assert_eq!(provider.entry_count(&dir).await.unwrap(), 2);
        assert!(provider.last_modified(&dir).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unresolvable_uri_is_not_found() {
        let factory: MemoryFactory = MemoryFactory::default();
        let provider: VfsProvider =
            VfsProvider::new(&properties(TWO_MOUNTS), &factory, ProviderOptions::default())
                .unwrap();
        let err: VfsError = provider.resolve("vfs://elsewhere/x").unwrap_err();
        assert!(err.is_not_found());
    }
}
