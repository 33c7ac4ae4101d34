//! Path algebra over `/`-separated string paths.
//!
//! Paths in the store are plain strings rather than `PathBuf`s: they become storage keys
//! verbatim, so they must look the same on every host.

pub const SEPARATOR: char = '/';
pub const ROOT: &str = "/";

/// Normalizes `path` into canonical absolute form.
///
/// Leading `/` is added when missing, repeated separators collapse, `.` components are
/// dropped and `..` climbs one level (never above the root). The trailing separator is
/// removed except for the root itself.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split(SEPARATOR) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }
    if parts.is_empty() {
        return ROOT.to_string();
    }
    let mut result = String::with_capacity(path.len() + 1);
    for part in parts {
        result.push(SEPARATOR);
        result.push_str(part);
    }
    result
}

pub fn is_root(path: &str) -> bool {
    path == ROOT
}

/// Returns everything before the last separator, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if is_root(path) {
        return None;
    }
    match path.rfind(SEPARATOR) {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Returns the final path segment.
pub fn basename(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Returns `dir` with exactly one trailing separator.
pub fn child_prefix(dir: &str) -> String {
    let mut prefix = dir.trim_end_matches(SEPARATOR).to_string();
    prefix.push(SEPARATOR);
    prefix
}

/// True if `path` lies strictly below `dir` (any depth).
pub fn is_descendant(path: &str, dir: &str) -> bool {
    path.starts_with(&child_prefix(dir)) && path != dir
}

/// True if `path` is exactly one level below `dir`.
pub fn is_direct_child(path: &str, dir: &str) -> bool {
    let prefix = child_prefix(dir);
    match path.strip_prefix(prefix.as_str()) {
        Some(rest) => path != dir && !rest.is_empty() && !rest.contains(SEPARATOR),
        None => false,
    }
}

/// Replaces the leading `old` of `path` with `new`.
///
/// Only an anchored match counts: occurrences of `old` further along `path` stay as they are.
/// Returns `None` if `path` is neither `old` nor below it.
pub fn replace_prefix(path: &str, old: &str, new: &str) -> Option<String> {
    if path == old {
        return Some(new.to_string());
    }
    if !is_descendant(path, old) {
        return None;
    }
    let rest = &path[child_prefix(old).len()..];
    let mut result = child_prefix(new);
    result.push_str(rest);
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/foo/bar"), "/foo/bar");
        assert_eq!(normalize("foo/bar"), "/foo/bar");
        assert_eq!(normalize("/foo/bar/"), "/foo/bar");
        assert_eq!(normalize("//foo///bar"), "/foo/bar");
        assert_eq!(normalize("/foo/././bar"), "/foo/bar");
        assert_eq!(normalize("/foo/./../bar"), "/bar");
        assert_eq!(normalize("/../../.."), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/a/b/c"), Some("/a/b"));
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/docs/Report.TXT"), "Report.TXT");
        assert_eq!(basename("/docs"), "docs");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn test_child_prefix() {
        assert_eq!(child_prefix("/docs"), "/docs/");
        assert_eq!(child_prefix("/docs/"), "/docs/");
        assert_eq!(child_prefix("/"), "/");
    }

    #[test]
    fn test_is_direct_child() {
        assert!(is_direct_child("/docs/a.txt", "/docs"));
        assert!(is_direct_child("/docs/sub", "/docs"));
        assert!(!is_direct_child("/docs/sub/b.txt", "/docs"));
        assert!(!is_direct_child("/docs", "/docs"));
        assert!(!is_direct_child("/docsx/a", "/docs"));
        assert!(is_direct_child("/docs", "/"));
        assert!(!is_direct_child("/", "/"));
    }

    #[test]
    fn test_is_descendant() {
        assert!(is_descendant("/a/b/c", "/a"));
        assert!(is_descendant("/a/b", "/a"));
        assert!(!is_descendant("/a", "/a"));
        assert!(!is_descendant("/ab", "/a"));
    }

    #[test]
    fn test_replace_prefix_is_anchored() {
        assert_eq!(replace_prefix("/a", "/a", "/z"), Some("/z".to_string()));
        assert_eq!(replace_prefix("/a/b/f", "/a", "/z"), Some("/z/b/f".to_string()));
        assert_eq!(replace_prefix("/a/x/a/y", "/a", "/z"), Some("/z/x/a/y".to_string()));
        assert_eq!(replace_prefix("/ab/c", "/a", "/z"), None);
        assert_eq!(replace_prefix("/b", "/a", "/z"), None);
    }
}
