//! Descriptor string helpers.
//!
//! A path descriptor is a `/`-separated string. Absolute descriptors start
//! with the separator; a trailing separator marks a directory-shaped key.
//! Reference resolution, dot-segment collapsing, and relativization follow
//! the generic URI-reference rules (RFC 3986 §5) applied to the descriptor.

/// Iterate the non-empty name components of a descriptor.
pub fn names(descriptor: &str) -> impl Iterator<Item = &str> {
    descriptor.split('/').filter(|s| !s.is_empty())
}

/// Number of non-empty name components.
pub fn name_count(descriptor: &str) -> usize {
    names(descriptor).count()
}

/// Last name component, without any trailing separator.
pub fn file_name(descriptor: &str) -> &str {
    let end: usize = if descriptor.ends_with('/') {
        descriptor.len() - 1
    } else {
        descriptor.len()
    };
    let begin: usize = descriptor[..end].rfind('/').map(|i| i + 1).unwrap_or(0);
    &descriptor[begin..end]
}

/// Parent prefix of a descriptor, including its trailing separator.
///
/// Returns the empty string when the descriptor has no parent.
pub fn parent_prefix(descriptor: &str) -> &str {
    let search_end: usize = if descriptor.ends_with('/') {
        descriptor.len().saturating_sub(1)
    } else {
        descriptor.len()
    };
    match descriptor[..search_end].rfind('/') {
        Some(i) => &descriptor[..=i],
        None => "",
    }
}

/// File suffix including the dot, or None for directory-shaped descriptors
/// and names without a dot.
pub fn suffix(descriptor: &str) -> Option<&str> {
    if descriptor.ends_with('/') {
        return None;
    }
    let name: &str = file_name(descriptor);
    name.rfind('.').map(|i| &name[i..])
}

/// Collapse "." and ".." segments (RFC 3986 §5.2.4).
///
/// Leading ".." segments of a relative descriptor are preserved; a ".."
/// applied to a trailing file segment leaves the directory form, so
/// `"/a/b/.."` collapses to `"/a/"`.
pub fn remove_dot_segments(descriptor: &str) -> String {
    let absolute: bool = descriptor.starts_with('/');
    let directory_form: bool = descriptor.ends_with('/')
        || descriptor.ends_with("/.")
        || descriptor.ends_with("/..")
        || descriptor == "."
        || descriptor == "..";

    let mut segments: Vec<&str> = Vec::new();
    for segment in descriptor.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }

    let mut result: String = String::new();
    if absolute {
        result.push('/');
    }
    result.push_str(&segments.join("/"));
    if directory_form && !segments.is_empty() {
        result.push('/');
    }
    result
}

/// Resolve a reference descriptor against a base descriptor
/// (RFC 3986 §5.3 merge followed by dot-segment removal).
pub fn resolve(base: &str, reference: &str) -> String {
    if reference.is_empty() {
        return base.to_string();
    }
    if reference.starts_with('/') {
        return remove_dot_segments(reference);
    }
    let merged: String = match base.rfind('/') {
        Some(i) => format!("{}{}", &base[..=i], reference),
        None => reference.to_string(),
    };
    remove_dot_segments(&merged)
}

/// Relativize a target descriptor against a base descriptor.
///
/// The base is treated as a directory; when it is an ancestor of the target
/// the remainder is returned, otherwise the target is returned unchanged
/// (mirroring generic URI relativization).
pub fn relativize(base: &str, target: &str) -> String {
    let base: String = remove_dot_segments(base);
    let target: String = remove_dot_segments(target);
    if base == target {
        return String::new();
    }
    let mut base_dir: String = base;
    if !base_dir.ends_with('/') {
        base_dir.push('/');
    }
    match target.strip_prefix(&base_dir) {
        Some(rest) => rest.to_string(),
        None => target,
    }
}
