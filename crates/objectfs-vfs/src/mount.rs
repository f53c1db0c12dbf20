//! Mount registry: containers, mount points, and prefix-based resolution.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use objectfs_storage::ObjectStore;

use crate::path::VirtualPath;

/// One backing container plus its cached client handle.
///
/// Shared by identity across every mount using the same
/// (credential, container, endpoint) tuple.
pub struct ContainerHandle {
    store: Arc<dyn ObjectStore>,
    container: String,
    endpoint: String,
    endpoint_internal: Option<String>,
    /// Canonical URI: `http://{container}.{endpoint}`.
    uri: String,
    /// Addressable domains in preference order: configured aliases first,
    /// then the primary and internal endpoint forms.
    cname: Vec<String>,
}

impl ContainerHandle {
    /// Build a handle for one container.
    ///
    /// # Arguments
    /// * `store` - Client for the backend this container lives on
    /// * `container` - Container name
    /// * `endpoint` - Primary (canonical) endpoint
    /// * `endpoint_internal` - Optional alternate/internal endpoint
    /// * `aliases` - Configured alias domains, highest preference first
    pub fn new(
        store: Arc<dyn ObjectStore>,
        container: impl Into<String>,
        endpoint: impl Into<String>,
        endpoint_internal: Option<String>,
        aliases: Vec<String>,
    ) -> Self {
        let container: String = container.into();
        let endpoint: String = endpoint.into();
        let uri: String = format!("http://{}.{}", container, endpoint);

        let mut cname: Vec<String> = aliases;
        cname.push(format!("{}.{}", container, endpoint));
        if let Some(internal) = &endpoint_internal {
            cname.push(format!("{}.{}", container, internal));
        }
        let mut deduped: Vec<String> = Vec::with_capacity(cname.len());
        for name in cname {
            if !deduped.contains(&name) {
                deduped.push(name);
            }
        }

        ContainerHandle {
            store,
            container,
            endpoint,
            endpoint_internal,
            uri,
            cname: deduped,
        }
    }

    /// Backend client for this container.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Primary endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Alternate/internal endpoint, if configured.
    pub fn endpoint_internal(&self) -> Option<&str> {
        self.endpoint_internal.as_deref()
    }

    /// Canonical URI of the container.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Addressable domains, highest preference first.
    pub fn cname(&self) -> &[String] {
        &self.cname
    }
}

/// One configured virtual filesystem: a container, a key prefix, and the set
/// of URI prefixes it is addressable under.
///
/// Built once from configuration at provider startup; read-mostly thereafter.
pub struct MountPoint {
    handle: Arc<ContainerHandle>,
    /// Key prefix inside the container; empty, or ending with the separator.
    prefix: String,
    /// Symbolic mount tag, e.g. `vfs://media/`.
    tag: Option<String>,
    /// Polling interval for watches registered through this mount.
    watch_interval: Duration,
}

impl MountPoint {
    /// Create a mount point over a container handle.
    pub fn new(
        handle: Arc<ContainerHandle>,
        prefix: impl Into<String>,
        tag: Option<String>,
        watch_interval: Duration,
    ) -> Self {
        MountPoint {
            handle,
            prefix: prefix.into(),
            tag,
            watch_interval,
        }
    }

    /// Backing container handle.
    pub fn handle(&self) -> &Arc<ContainerHandle> {
        &self.handle
    }

    /// Key prefix inside the container.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Symbolic mount tag, if configured.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Polling interval for watches registered through this mount.
    pub fn watch_interval(&self) -> Duration {
        self.watch_interval
    }

    /// Canonical URI of the mount root (primary endpoint + prefix).
    pub fn canonical_uri(&self) -> String {
        format!("{}/{}", self.handle.uri(), self.prefix)
    }

    /// Every URI prefix this mount is addressable under: one per container
    /// alias domain, plus the symbolic mount tag.
    pub fn alternative_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .handle
            .cname()
            .iter()
            .map(|name| format!("http://{}/{}", name, self.prefix))
            .collect();
        if let Some(tag) = &self.tag {
            uris.push(tag.clone());
        }
        uris
    }

    /// Build a path on this mount.
    ///
    /// An absolute descriptor (leading separator) is rooted at the mount's
    /// key prefix; a relative descriptor is taken as-is.
    pub fn path(self: &Arc<Self>, descriptor: &str) -> VirtualPath {
        if let Some(rest) = descriptor.strip_prefix('/') {
            VirtualPath::new(self.clone(), format!("/{}{}", self.prefix, rest))
        } else {
            VirtualPath::new(self.clone(), descriptor.to_string())
        }
    }

    /// Root path of this mount.
    pub fn root(self: &Arc<Self>) -> VirtualPath {
        VirtualPath::new(self.clone(), format!("/{}", self.prefix))
    }
}

/// URI prefix ordered longest-first, then lexicographically, so the most
/// specific mount always wins over a more general one.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PrefixKey(String);

impl Ord for PrefixKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .len()
            .cmp(&self.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for PrefixKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Registry of configured mounts with prefix-based path resolution.
#[derive(Default)]
pub struct MountTable {
    entries: BTreeMap<PrefixKey, Arc<MountPoint>>,
}

impl MountTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mount under every URI prefix it is addressable under.
    pub fn insert(&mut self, mount: Arc<MountPoint>) {
        for uri in mount.alternative_uris() {
            self.entries.insert(PrefixKey(uri), mount.clone());
        }
    }

    /// Resolve a URI into a virtual path.
    ///
    /// Prefixes are matched longest-first; the matched prefix is stripped and
    /// the remainder becomes the mount's absolute path. No match is not an
    /// error: the URI simply lives outside every configured mount.
    pub fn resolve(&self, uri: &str) -> Option<VirtualPath> {
        self.entries
            .iter()
            .find(|(prefix, _)| uri.starts_with(&prefix.0))
            .map(|(prefix, mount)| mount.path(&format!("/{}", &uri[prefix.0.len()..])))
    }

    /// Distinct mount points, in registration prefix order.
    pub fn mounts(&self) -> Vec<Arc<MountPoint>> {
        let mut seen: Vec<Arc<MountPoint>> = Vec::new();
        for mount in self.entries.values() {
            if !seen.iter().any(|m| Arc::ptr_eq(m, mount)) {
                seen.push(mount.clone());
            }
        }
        seen
    }

    /// Number of registered URI prefixes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no mounts are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objectfs_storage::MemoryObjectStore;

    fn handle() -> Arc<ContainerHandle> {
        Arc::new(ContainerHandle::new(
            Arc::new(MemoryObjectStore::new()),
            "bucket",
            "storage.example.com",
            Some("storage-internal.example.com".to_string()),
            vec!["cdn.example.com".to_string()],
        ))
    }

    fn mount(prefix: &str, tag: Option<&str>) -> Arc<MountPoint> {
        Arc::new(MountPoint::new(
            handle(),
            prefix,
            tag.map(str::to_string),
            Duration::from_secs(60),
        ))
    }

    #[test]
    fn test_cname_order_and_dedup() {
        let h: Arc<ContainerHandle> = handle();
        assert_eq!(
            h.cname(),
            &[
                "cdn.example.com".to_string(),
                "bucket.storage.example.com".to_string(),
                "bucket.storage-internal.example.com".to_string(),
            ]
        );
        assert_eq!(h.uri(), "http://bucket.storage.example.com");
    }

    #[test]
    fn test_resolve_strips_prefix() {
        let mut table: MountTable = MountTable::new();
        table.insert(mount("data/", Some("vfs://data/")));

        let path: VirtualPath = table
            .resolve("http://bucket.storage.example.com/data/sub/file.txt")
            .unwrap();
        assert_eq!(path.descriptor(), "/data/sub/file.txt");
        assert_eq!(path.object_key(), Some("data/sub/file.txt"));

        // The mount tag resolves to the same key space.
        let tagged: VirtualPath = table.resolve("vfs://data/sub/file.txt").unwrap();
        assert_eq!(tagged.descriptor(), "/data/sub/file.txt");
    }

    #[test]
    fn test_resolve_roundtrip_primary_endpoint() {
        let mut table: MountTable = MountTable::new();
        table.insert(mount("data/", None));

        let uri: &str = "http://bucket.storage.example.com/data/x/y";
        let path: VirtualPath = table.resolve(uri).unwrap();
        assert_eq!(path.to_canonical_uri().unwrap(), uri);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut table: MountTable = MountTable::new();
        let general: Arc<MountPoint> = mount("data/", None);
        let specific: Arc<MountPoint> = mount("data/images/", None);
        table.insert(general);
        table.insert(specific.clone());

        let path: VirtualPath = table
            .resolve("http://bucket.storage.example.com/data/images/a.png")
            .unwrap();
        assert!(Arc::ptr_eq(path.mount(), &specific));
        assert_eq!(path.object_key(), Some("data/images/a.png"));
    }

    #[test]
    fn test_no_match_is_none() {
        let mut table: MountTable = MountTable::new();
        table.insert(mount("data/", None));
        assert!(table.resolve("http://other.example.com/data/x").is_none());
    }
}
