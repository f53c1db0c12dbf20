//! Virtual paths: a mount point plus a descriptor string.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::VfsError;
use crate::mount::MountPoint;
use crate::names;

/// A location on one mount.
///
/// The descriptor is a `/`-separated string; absolute descriptors (leading
/// separator) address an object key inside the mount's container, relative
/// descriptors only carry name components. A trailing separator marks a
/// directory-shaped path. Two paths are equal when they address the same
/// mount root and carry the same descriptor.
#[derive(Clone)]
pub struct VirtualPath {
    mount: Arc<MountPoint>,
    descriptor: String,
}

impl VirtualPath {
    pub(crate) fn new(mount: Arc<MountPoint>, descriptor: String) -> Self {
        VirtualPath { mount, descriptor }
    }

    /// Mount this path lives on.
    pub fn mount(&self) -> &Arc<MountPoint> {
        &self.mount
    }

    /// Raw descriptor string.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// True if the descriptor is absolute (addresses an object key).
    pub fn is_absolute(&self) -> bool {
        self.descriptor.starts_with('/')
    }

    /// True if the path is directory-shaped (trailing separator, or the
    /// empty relative descriptor).
    pub fn is_directory(&self) -> bool {
        self.descriptor.ends_with('/') || self.descriptor.is_empty()
    }

    /// True if the path is file-shaped.
    pub fn is_file(&self) -> bool {
        !self.is_directory()
    }

    /// Object key addressed by this path, for absolute paths.
    ///
    /// The mount root maps to the mount's key prefix (possibly empty).
    pub fn object_key(&self) -> Option<&str> {
        self.descriptor.strip_prefix('/')
    }

    /// Last name component.
    pub fn file_name(&self) -> &str {
        names::file_name(&self.descriptor)
    }

    /// File suffix including the dot, if any.
    pub fn suffix(&self) -> Option<&str> {
        names::suffix(&self.descriptor)
    }

    /// Number of name components.
    pub fn name_count(&self) -> usize {
        names::name_count(&self.descriptor)
    }

    /// Iterate the name components.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        names::names(&self.descriptor)
    }

    /// Name component at an index.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names().nth(index)
    }

    /// Parent directory, or None at the mount root / a bare name.
    ///
    /// The parent of the mount root (or of anything above the mount's key
    /// prefix) is not addressable through this mount.
    pub fn parent(&self) -> Option<VirtualPath> {
        let prefix: &str = names::parent_prefix(&self.descriptor);
        if prefix.is_empty() {
            return None;
        }
        if self.is_absolute() && prefix.len() < self.mount.prefix().len() + 1 {
            return None;
        }
        Some(VirtualPath::new(self.mount.clone(), prefix.to_string()))
    }

    /// Collapse "." and ".." segments.
    pub fn normalize(&self) -> VirtualPath {
        VirtualPath::new(
            self.mount.clone(),
            names::remove_dot_segments(&self.descriptor),
        )
    }

    /// Resolve a reference against this path.
    pub fn resolve(&self, reference: &str) -> VirtualPath {
        VirtualPath::new(
            self.mount.clone(),
            names::resolve(&self.descriptor, reference),
        )
    }

    /// Resolve a reference against this path's parent directory, so the
    /// result is a sibling of this path whether it is file- or
    /// directory-shaped.
    ///
    /// A parentless path (the mount root, or a bare relative name) resolves
    /// the reference against itself.
    pub fn resolve_sibling(&self, reference: &str) -> VirtualPath {
        match self.parent() {
            Some(parent) => parent.resolve(reference),
            None => self.resolve(reference),
        }
    }

    /// Express another path relative to this one.
    ///
    /// When this path is an ancestor of the target, the result carries the
    /// remaining components; otherwise the target's descriptor is returned
    /// unchanged.
    pub fn relativize(&self, target: &VirtualPath) -> VirtualPath {
        VirtualPath::new(
            self.mount.clone(),
            names::relativize(&self.descriptor, &target.descriptor),
        )
    }

    /// Relative path over the half-open component range `[begin, end)`.
    ///
    /// The trailing separator is preserved when the range reaches a
    /// directory-shaped path's last component.
    pub fn subpath(&self, begin: usize, end: usize) -> Result<VirtualPath, VfsError> {
        let count: usize = self.name_count();
        if begin >= end || end > count {
            return Err(VfsError::IllegalUsage(format!(
                "subpath range {}..{} out of bounds for {} components",
                begin, end, count
            )));
        }
        let mut descriptor: String = self
            .names()
            .skip(begin)
            .take(end - begin)
            .collect::<Vec<&str>>()
            .join("/");
        if end == count && self.is_directory() {
            descriptor.push('/');
        }
        Ok(VirtualPath::new(self.mount.clone(), descriptor))
    }

    /// Plain string-prefix containment on the descriptors.
    pub fn starts_with(&self, other: &VirtualPath) -> bool {
        self.descriptor.starts_with(&other.descriptor)
    }

    /// Plain string-suffix containment on the descriptors.
    pub fn ends_with(&self, other: &VirtualPath) -> bool {
        self.descriptor.ends_with(&other.descriptor)
    }

    /// Canonical URI (primary endpoint), for absolute paths.
    pub fn to_canonical_uri(&self) -> Result<String, VfsError> {
        match self.object_key() {
            Some(key) => Ok(format!("{}/{}", self.mount.handle().uri(), key)),
            None => Err(VfsError::IllegalUsage(format!(
                "relative path has no URI: {}",
                self.descriptor
            ))),
        }
    }

    /// URI under the container's most-preferred alias domain, for absolute
    /// paths. Falls back to the canonical URI when no alias is configured.
    pub fn to_preferred_uri(&self) -> Result<String, VfsError> {
        let key: &str = self.object_key().ok_or_else(|| {
            VfsError::IllegalUsage(format!("relative path has no URI: {}", self.descriptor))
        })?;
        match self.mount.handle().cname().first() {
            Some(domain) => Ok(format!("http://{}/{}", domain, key)),
            None => self.to_canonical_uri(),
        }
    }

    /// Symbolic URI under the mount tag, when one is configured and the path
    /// lies under the mount's key prefix; canonical URI otherwise.
    pub fn to_display_uri(&self) -> Result<String, VfsError> {
        if let (Some(tag), Some(key)) = (self.mount.tag(), self.object_key()) {
            if let Some(rest) = key.strip_prefix(self.mount.prefix()) {
                return Ok(format!("{}{}", tag, rest));
            }
        }
        self.to_canonical_uri()
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_display_uri() {
            Ok(uri) => f.write_str(&uri),
            Err(_) => f.write_str(&self.descriptor),
        }
    }
}

impl fmt::Debug for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualPath")
            .field("mount", &self.mount.canonical_uri())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl PartialEq for VirtualPath {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
            && (Arc::ptr_eq(&self.mount, &other.mount)
                || self.mount.canonical_uri() == other.mount.canonical_uri())
    }
}

impl Eq for VirtualPath {}

impl Hash for VirtualPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.mount.canonical_uri().hash(state);
        self.descriptor.hash(state);
    }
}
