//! Staged random-access channel over a single object.
//!
//! Objects are immutable values on the backend, so random access is staged
//! through a local temporary file: the object is downloaded once at open,
//! reads, writes, seeks, and truncates hit the local file, and a dirty
//! channel uploads the whole staging file back on close. Concurrent channels
//! on the same object do not see each other's writes until close; last close
//! wins.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use tempfile::NamedTempFile;

use objectfs_storage::ObjectStore;

use crate::error::VfsError;
use crate::path::VirtualPath;

/// Random-access channel staged through a local temporary file.
///
/// Dropping the channel without [`close`](StagedChannel::close) discards any
/// staged writes; the staging file itself is always removed.
pub struct StagedChannel {
    store: Arc<dyn ObjectStore>,
    container: String,
    key: String,
    temp: Option<NamedTempFile>,
    file: File,
    dirty: bool,
}

impl std::fmt::Debug for StagedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedChannel")
            .field("container", &self.container)
            .field("key", &self.key)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl StagedChannel {
    /// Open a channel on an existing object.
    ///
    /// # Returns
    /// `VfsError::NotFound` if the object does not exist.
    pub async fn open(path: &VirtualPath) -> Result<Self, VfsError> {
        Self::open_inner(path, false).await
    }

    /// Open a channel, starting from an empty staging file when the object
    /// does not exist yet.
    pub async fn create(path: &VirtualPath) -> Result<Self, VfsError> {
        Self::open_inner(path, true).await
    }

    async fn open_inner(path: &VirtualPath, create: bool) -> Result<Self, VfsError> {
        if path.is_directory() {
            return Err(VfsError::NotFile(path.descriptor().to_string()));
        }
        let key: String = path
            .object_key()
            .ok_or_else(|| VfsError::IllegalUsage("cannot open a relative path".to_string()))?
            .to_string();
        let store: Arc<dyn ObjectStore> = path.mount().handle().store().clone();
        let container: String = path.mount().handle().container().to_string();

        let temp: NamedTempFile = NamedTempFile::new()?;
        match store
            .get_object_to_file(&container, &key, temp.path())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() && create => {}
            Err(e) => return Err(e.into()),
        }

        // The download may have replaced the file behind the path, so take a
        // fresh handle rather than reusing the one the temp file was created
        // with.
        let file: File = File::options().read(true).write(true).open(temp.path())?;

        Ok(StagedChannel {
            store,
            container,
            key,
            temp: Some(temp),
            file,
            dirty: false,
        })
    }

    /// Current size of the staging file.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// True when the staging file is empty.
    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncate or extend the staging file.
    pub fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.file.set_len(size)?;
        self.dirty = true;
        Ok(())
    }

    /// True if staged writes exist that close would upload.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Upload staged writes (if any) and remove the staging file.
    ///
    /// The staging file is removed whether or not the upload succeeds.
    pub async fn close(mut self) -> Result<(), VfsError> {
        let result: Result<(), VfsError> = if self.dirty {
            match self.temp.as_ref() {
                Some(temp) => self
                    .store
                    .put_object_from_file(&self.container, &self.key, temp.path())
                    .await
                    .map_err(VfsError::from),
                None => Ok(()),
            }
        } else {
            Ok(())
        };
        self.dirty = false;

        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                tracing::debug!(key = %self.key, error = %e, "staging file removal deferred");
            }
        }
        result
    }
}

impl Read for StagedChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for StagedChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written: usize = self.file.write(buf)?;
        if written > 0 {
            self.dirty = true;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for StagedChannel {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Drop for StagedChannel {
    fn drop(&mut self) {
        // NamedTempFile removes the staging file; staged writes are lost.
        if self.dirty {
            tracing::warn!(key = %self.key, "staged channel dropped with unflushed writes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::{ContainerHandle, MountPoint};
    use objectfs_storage::MemoryObjectStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn mounted(store: Arc<MemoryObjectStore>) -> Arc<MountPoint> {
        let handle: Arc<ContainerHandle> = Arc::new(ContainerHandle::new(
            store,
            "bucket",
            "storage.example.com",
            None,
            Vec::new(),
        ));
        Arc::new(MountPoint::new(handle, "", None, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_create_write_close_read_back() {
        let store: Arc<MemoryObjectStore> = Arc::new(MemoryObjectStore::new());
        let mount: Arc<MountPoint> = mounted(store.clone());
        let path: VirtualPath = mount.path("/notes.txt");

        let mut channel: StagedChannel = StagedChannel::create(&path).await.unwrap();
        channel.write_all(b"hello staged world").unwrap();
        channel.close().await.unwrap();

        let data: Vec<u8> = store.get_object("bucket", "notes.txt").await.unwrap();
        assert_eq!(data, b"hello staged world");
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let store: Arc<MemoryObjectStore> = Arc::new(MemoryObjectStore::new());
        let mount: Arc<MountPoint> = mounted(store);
        let err: VfsError = StagedChannel::open(&mount.path("/gone.txt")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_clean_close_skips_upload() {
        let store: Arc<MemoryObjectStore> = Arc::new(MemoryObjectStore::new());
        store
            .put_object("bucket", "a.txt", b"original", None, None)
            .await
            .unwrap();
        let mount: Arc<MountPoint> = mounted(store.clone());

        let etag_before: Option<String> = store
            .head_object("bucket", "a.txt")
            .await
            .unwrap()
            .unwrap()
            .etag;

        let mut channel: StagedChannel = StagedChannel::open(&mount.path("/a.txt")).await.unwrap();
        let mut contents: String = String::new();
        channel.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "original");
        assert!(!channel.is_dirty());
        channel.close().await.unwrap();

        let etag_after: Option<String> = store
            .head_object("bucket", "a.txt")
            .await
            .unwrap()
            .unwrap()
            .etag;
        assert_eq!(etag_before, etag_after);
    }

    #[tokio::test]
    async fn test_seek_overwrite_and_truncate() {
        let store: Arc<MemoryObjectStore> = Arc::new(MemoryObjectStore::new());
        store
            .put_object("bucket", "a.txt", b"0123456789", None, None)
            .await
            .unwrap();
        let mount: Arc<MountPoint> = mounted(store.clone());
        let path: VirtualPath = mount.path("/a.txt");

        let mut channel: StagedChannel = StagedChannel::open(&path).await.unwrap();
        channel.seek(SeekFrom::Start(2)).unwrap();
        channel.write_all(b"xx").unwrap();
        channel.truncate(6).unwrap();
        assert!(channel.is_dirty());
        channel.close().await.unwrap();

        let data: Vec<u8> = store.get_object("bucket", "a.txt").await.unwrap();
        assert_eq!(data, b"01xx45");
    }

    #[tokio::test]
    async fn test_drop_discards_staged_writes() {
        let store: Arc<MemoryObjectStore> = Arc::new(MemoryObjectStore::new());
        store
            .put_object("bucket", "a.txt", b"original", None, None)
            .await
            .unwrap();
        let mount: Arc<MountPoint> = mounted(store.clone());

        {
            let mut channel: StagedChannel =
                StagedChannel::open(&mount.path("/a.txt")).await.unwrap();
            channel.write_all(b"discarded").unwrap();
        }

        let data: Vec<u8> = store.get_object("bucket", "a.txt").await.unwrap();
        assert_eq!(data, b"original");
    }

    #[tokio::test]
    async fn test_directory_shaped_path_rejected() {
        let store: Arc<MemoryObjectStore> = Arc::new(MemoryObjectStore::new());
        let mount: Arc<MountPoint> = mounted(store);
        assert!(matches!(
            StagedChannel::create(&mount.path("/dir/")).await,
            Err(VfsError::NotFile(_))
        ));
    }
}
