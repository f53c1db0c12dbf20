//! Flat-property configuration.
//!
//! Configuration arrives as flat `group.key = value` properties. Each group
//! describes one mount; the reserved `default` group supplies fallback values
//! for every other group (credentials and endpoints are usually set once
//! there). Values are plain strings; validation happens when a group is
//! turned into a [`MountConfig`].

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::VfsError;

/// Group name whose values back-fill every other group.
pub const DEFAULT_GROUP: &str = "default";

const DEFAULT_WATCH_INTERVAL_MS: u64 = 60_000;

/// Flat properties bucketed by group.
#[derive(Debug, Default, Clone)]
pub struct PropertySet {
    groups: BTreeMap<String, BTreeMap<String, String>>,
}

impl PropertySet {
    /// Create an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one property. The name is split at its first `.` into
    /// `(group, key)`; a name without a dot lands in the `default` group.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let (group, key): (&str, &str) = match name.split_once('.') {
            Some((group, key)) => (group, key),
            None => (DEFAULT_GROUP, name),
        };
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Parse `name = value` lines. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, VfsError> {
        let mut properties: PropertySet = PropertySet::new();
        for (number, line) in text.lines().enumerate() {
            let line: &str = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value): (&str, &str) = line.split_once('=').ok_or_else(|| {
                VfsError::Configuration(format!("line {}: missing '=': {}", number + 1, line))
            })?;
            properties.set(name.trim(), value.trim());
        }
        Ok(properties)
    }

    /// Look up a key in a group, falling back to the `default` group.
    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.groups
            .get(group)
            .and_then(|g| g.get(key))
            .or_else(|| self.groups.get(DEFAULT_GROUP).and_then(|g| g.get(key)))
            .map(String::as_str)
    }

    /// Names of the mount groups, excluding `default`.
    pub fn mount_groups(&self) -> impl Iterator<Item = &str> {
        self.groups
            .keys()
            .map(String::as_str)
            .filter(|g| *g != DEFAULT_GROUP)
    }

    /// Resolve one group into a validated mount configuration.
    pub fn mount_config(&self, group: &str) -> Result<MountConfig, VfsError> {
        let require = |key: &str| -> Result<String, VfsError> {
            self.get(group, key).map(str::to_string).ok_or_else(|| {
                VfsError::Configuration(format!("mount '{}': missing '{}'", group, key))
            })
        };

        let mut prefix: String = self.get(group, "prefix").unwrap_or("").to_string();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        if prefix.starts_with('/') {
            return Err(VfsError::Configuration(format!(
                "mount '{}': prefix must not start with '/': {}",
                group, prefix
            )));
        }

        let mount_tag: Option<String> = self.get(group, "mount").map(str::to_string);
        if let Some(tag) = &mount_tag {
            if !tag.ends_with('/') {
                return Err(VfsError::Configuration(format!(
                    "mount '{}': mount tag must end with '/': {}",
                    group, tag
                )));
            }
        }

        let cname: Vec<String> = self
            .get(group, "cname")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let watch_interval_ms: u64 = match self.get(group, "watch-interval") {
            Some(value) => value.parse().map_err(|_| {
                VfsError::Configuration(format!(
                    "mount '{}': invalid watch-interval: {}",
                    group, value
                ))
            })?,
            None => DEFAULT_WATCH_INTERVAL_MS,
        };
        if watch_interval_ms == 0 {
            return Err(VfsError::Configuration(format!(
                "mount '{}': watch-interval must be positive",
                group
            )));
        }

        Ok(MountConfig {
            name: group.to_string(),
            access_key_id: require("access-key-id")?,
            secret_access_key: require("secret-access-key")?,
            container: require("container")?,
            endpoint: require("endpoint")?,
            endpoint_internal: self.get(group, "endpoint-internal").map(str::to_string),
            prefix,
            mount_tag,
            cname,
            watch_interval: Duration::from_millis(watch_interval_ms),
        })
    }

    /// Resolve every mount group.
    pub fn mount_configs(&self) -> Result<Vec<MountConfig>, VfsError> {
        self.mount_groups()
            .map(|group| self.mount_config(group))
            .collect()
    }
}

/// Validated configuration for one mount.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Group name the mount was configured under.
    pub name: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub container: String,
    /// Primary endpoint domain.
    pub endpoint: String,
    /// Alternate/internal endpoint domain.
    pub endpoint_internal: Option<String>,
    /// Key prefix inside the container; empty, or ending with `/`.
    pub prefix: String,
    /// Symbolic mount tag, e.g. `vfs://media/`.
    pub mount_tag: Option<String>,
    /// Alias domains the container is addressable under.
    pub cname: Vec<String>,
    /// Polling interval for watches on this mount.
    pub watch_interval: Duration,
}

impl MountConfig {
    /// Dedup key for sharing one client per credential+endpoint pair.
    pub fn client_key(&self) -> String {
        format!(
            "{}:{}@{}",
            self.access_key_id, self.secret_access_key, self.endpoint
        )
    }

    /// Dedup key for sharing one container handle per credential+container.
    pub fn container_key(&self) -> String {
        format!(
            "{}:{}@{}.{}",
            self.access_key_id, self.secret_access_key, self.container, self.endpoint
        )
    }
}
