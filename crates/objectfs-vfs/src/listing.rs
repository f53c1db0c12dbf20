//! Lazy directory listing over marker-based pagination.

use std::collections::VecDeque;
use std::sync::Arc;

use objectfs_storage::{ObjectPage, ObjectStore, ObjectSummary};

use crate::error::VfsError;
use crate::mount::MountPoint;
use crate::path::VirtualPath;

/// One listing entry: the entry's path plus the backend summary it came from.
///
/// Pseudo-directories synthesized from grouped prefixes carry a summary with
/// zero size and no timestamp.
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub path: VirtualPath,
    pub summary: ObjectSummary,
}

impl ListEntry {
    /// True for directory-shaped entries.
    pub fn is_directory(&self) -> bool {
        self.summary.is_directory()
    }
}

/// Cursor over the entries under a directory-shaped path.
///
/// Pages are fetched on demand; a page's grouped prefixes are yielded as
/// pseudo-directories before its objects. An absent prefix yields an empty
/// listing rather than an error. The cursor observes each page at the moment
/// it is fetched, so entries created or deleted mid-iteration may or may not
/// appear.
pub struct ListingCursor {
    store: Arc<dyn ObjectStore>,
    container: String,
    mount: Arc<MountPoint>,
    prefix: String,
    delimiter: Option<&'static str>,
    marker: Option<String>,
    buffer: VecDeque<ListEntry>,
    done: bool,
}

impl ListingCursor {
    /// Cursor over the immediate children of a directory.
    pub fn shallow(directory: &VirtualPath) -> Result<Self, VfsError> {
        Self::new(directory, Some("/"))
    }

    /// Cursor over every object below a directory, at any depth.
    ///
    /// No delimiter is sent, so no pseudo-directories are synthesized; every
    /// entry is a real backend object.
    pub fn recursive(directory: &VirtualPath) -> Result<Self, VfsError> {
        Self::new(directory, None)
    }

    fn new(directory: &VirtualPath, delimiter: Option<&'static str>) -> Result<Self, VfsError> {
        if !directory.is_directory() {
            return Err(VfsError::NotDirectory(directory.descriptor().to_string()));
        }
        let prefix: String = directory
            .object_key()
            .ok_or_else(|| VfsError::IllegalUsage("cannot list a relative path".to_string()))?
            .to_string();
        let mount: Arc<MountPoint> = directory.mount().clone();
        Ok(ListingCursor {
            store: mount.handle().store().clone(),
            container: mount.handle().container().to_string(),
            mount,
            prefix,
            delimiter,
            marker: None,
            buffer: VecDeque::new(),
            done: false,
        })
    }

    /// Next entry, fetching further pages as needed.
    pub async fn next(&mut self) -> Result<Option<ListEntry>, VfsError> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Ok(Some(entry));
            }
            if self.done {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Drain the remaining entries into a vector.
    pub async fn collect(mut self) -> Result<Vec<ListEntry>, VfsError> {
        let mut entries: Vec<ListEntry> = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn fetch_page(&mut self) -> Result<(), VfsError> {
        let page: ObjectPage = match self
            .store
            .list_page(
                &self.container,
                &self.prefix,
                self.delimiter,
                self.marker.as_deref(),
            )
            .await
        {
            Ok(page) => page,
            // An absent prefix is an empty directory, not a failure.
            Err(e) if e.is_not_found() => {
                self.done = true;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        for prefix in page.common_prefixes {
            self.push_entry(ObjectSummary::pseudo_directory(prefix));
        }
        for object in page.objects {
            self.push_entry(object);
        }

        match page.next_marker {
            Some(marker) => self.marker = Some(marker),
            None => self.done = true,
        }
        Ok(())
    }

    fn push_entry(&mut self, summary: ObjectSummary) {
        // The directory's own placeholder object is not one of its entries.
        if summary.key == self.prefix {
            return;
        }
        let path: VirtualPath =
            VirtualPath::new(self.mount.clone(), format!("/{}", summary.key));
        self.buffer.push_back(ListEntry { path, summary });
    }
}
