//! Path helpers for the `/`-delimited node namespace.

use crate::error::{StoreError, StoreResult};

/// The namespace root.
pub const ROOT: &str = "/";

/// Validates a node path.
///
/// A valid path is absolute, has no trailing slash (except the root itself),
/// and contains no empty, `.` or `..` segments and no NUL characters.
///
/// # Errors
///
/// Returns [`StoreError::InvalidPath`] describing the first problem found.
pub fn validate_path(path: &str) -> StoreResult<()> {
    if path.is_empty() {
        return Err(StoreError::invalid_path(path, "path must not be empty"));
    }
    if !path.starts_with('/') {
        return Err(StoreError::invalid_path(path, "path must start with /"));
    }
    if path == ROOT {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(StoreError::invalid_path(path, "path must not end with /"));
    }
    if path.contains('\0') {
        return Err(StoreError::invalid_path(path, "null character not allowed"));
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => return Err(StoreError::invalid_path(path, "empty node name")),
            "." | ".." => {
                return Err(StoreError::invalid_path(path, "relative segment not allowed"))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Returns the parent of a valid path, or `None` for the root.
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Returns the last segment of a valid path (empty for the root).
#[must_use]
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Joins a parent path and a child name.
#[must_use]
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Returns every proper ancestor of a valid path, nearest to the root first.
///
/// The root itself is not included.
#[must_use]
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        if p == ROOT {
            break;
        }
        out.push(p);
        current = parent(p);
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_paths() {
        for p in ["/", "/a", "/a/b", "/node-1/child_2", "/zookeeper/quota"] {
            assert!(validate_path(p).is_ok(), "{p} should be valid");
        }
    }

    #[test]
    fn invalid_paths() {
        for p in ["", "a", "/a/", "//a", "/a//b", "/a/./b", "/a/..", "/a\0b"] {
            assert!(
                matches!(validate_path(p), Err(StoreError::InvalidPath { .. })),
                "{p:?} should be invalid"
            );
        }
    }

    #[test]
    fn parent_of_paths() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/a/b/c"), Some("/a/b"));
    }

    #[test]
    fn node_names() {
        assert_eq!(node_name("/a/b"), "b");
        assert_eq!(node_name("/a"), "a");
        assert_eq!(node_name("/"), "");
    }

    #[test]
    fn join_paths() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }

    #[test]
    fn ancestors_nearest_root_first() {
        assert_eq!(ancestors("/a/b/c"), vec!["/a", "/a/b"]);
        assert!(ancestors("/a").is_empty());
        assert!(ancestors("/").is_empty());
    }

    mod props {
        use super::super::*;
        use proptest::prelude::*;

        fn segments() -> impl Strategy<Value = Vec<String>> {
            prop::collection::vec("[a-z0-9_-]{1,8}", 1..6)
        }

        proptest! {
            #[test]
            fn joined_segments_are_valid(parts in segments()) {
                let path = parts.iter().fold(ROOT.to_string(), |acc, part| join(&acc, part));
                prop_assert!(validate_path(&path).is_ok());
                prop_assert_eq!(node_name(&path), parts.last().unwrap().as_str());
                prop_assert_eq!(ancestors(&path).len(), parts.len() - 1);
            }

            #[test]
            fn parent_of_join_is_parent(parts in segments(), child in "[a-z]{1,8}") {
                let base = format!("/{}", parts.join("/"));
                let path = join(&base, &child);
                prop_assert_eq!(parent(&path), Some(base.as_str()));
            }
        }
    }
}
