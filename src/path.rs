//! Path prefix scoping and path normalization.
//!
//! An adapter can be scoped to a subtree of a share by giving it a prefix.
//! Callers only ever see prefix-relative paths: [`PathPrefixer::prefix_path`]
//! is applied exactly once on the way to the remote client and
//! [`PathPrefixer::strip_prefix`] exactly once on the way back.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::errors::FsError;

/// Applies and strips a configured path prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPrefixer {
    /// Either empty, or the trimmed prefix followed by a single `/`.
    prefix: String,
}

impl PathPrefixer {
    /// Create a prefixer. Leading and trailing separators are trimmed, so
    /// `"/a/b/"`, `"a/b"` and `"a/b//"` all scope to the same subtree.
    pub fn new(prefix: &str) -> Self {
        let trimmed = prefix.trim_matches(is_separator);
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };
        Self { prefix }
    }

    /// The prefix without its trailing separator (empty when unscoped).
    pub fn prefix(&self) -> &str {
        self.prefix.trim_end_matches('/')
    }

    /// Whether a prefix is configured at all.
    pub fn is_scoped(&self) -> bool {
        !self.prefix.is_empty()
    }

    /// Prepend the prefix to a prefix-relative path.
    ///
    /// Not idempotent: feeding an already prefixed path back in prefixes it
    /// a second time.
    pub fn prefix_path(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path.trim_start_matches(is_separator))
    }

    /// Prefix a directory path, dropping the separator the prefix leaves
    /// behind when `path` is the adapter root.
    pub fn prefix_directory_path(&self, path: &str) -> String {
        self.prefix_path(path).trim_matches('/').to_string()
    }

    /// Remove the prefix from a remote path. Paths that do not carry the
    /// prefix are returned unchanged.
    pub fn strip_prefix(&self, path: &str) -> String {
        path.strip_prefix(self.prefix.as_str())
            .unwrap_or(path)
            .to_string()
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Normalize a caller supplied path.
///
/// Backslashes become `/`, empty and `.` segments collapse, and `..`
/// segments are resolved. A path that climbs above the root, or that
/// contains control characters, is rejected.
pub fn normalize_path(path: &str) -> Result<String, FsError> {
    if path.chars().any(char::is_control) {
        return Err(FsError::CorruptedPathDetected {
            path: path.to_string(),
        });
    }

    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if parts.pop().is_none() {
                    return Err(FsError::PathTraversalDetected {
                        path: path.to_string(),
                    });
                }
            }
            other => parts.push(other),
        }
    }

    Ok(parts.join("/"))
}

/// Join a directory path and a child name without doubling separators.
pub fn join_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent, name).trim_matches('/').to_string()
}

/// The directory containing `path`, or `""` for top-level entries.
pub fn parent_directory(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => "",
    }
}

/// Percent-encoding set for a single path segment: everything except
/// unreserved characters.
const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode each segment of `path` on its own.  Separators are never
/// encoded, otherwise nested paths stop resolving.
pub fn encode_path_segments(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Inverse of [`encode_path_segments`].  `None` if a segment does not
/// decode to UTF-8.
pub fn decode_path_segments(path: &str) -> Option<String> {
    path.split('/')
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .ok()
                .map(|s| s.into_owned())
        })
        .collect::<Option<Vec<_>>>()
        .map(|segments| segments.join("/"))
}

/// Every ancestor-or-self of `path`, shortest first: `a`, `a/b`, `a/b/c`.
pub fn cumulative_segments(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_trimmed_of_separators() {
        assert_eq!(PathPrefixer::new("/a/b/").prefix(), "a/b");
        assert_eq!(PathPrefixer::new("a/b").prefix(), "a/b");
        assert_eq!(PathPrefixer::new("\\a\\").prefix(), "a");
        assert_eq!(PathPrefixer::new("").prefix(), "");
        assert_eq!(PathPrefixer::new("///").prefix(), "");
        assert!(!PathPrefixer::new("/").is_scoped());
    }

    #[test]
    fn test_prefix_path_joins_once() {
        let prefixer = PathPrefixer::new("p1/p2");
        assert_eq!(prefixer.prefix_path("file.txt"), "p1/p2/file.txt");
        assert_eq!(prefixer.prefix_path("/file.txt"), "p1/p2/file.txt");
        assert_eq!(prefixer.prefix_path("sub/file.txt"), "p1/p2/sub/file.txt");
        assert_eq!(prefixer.prefix_path(""), "p1/p2/");
    }

    #[test]
    fn test_prefix_path_without_prefix() {
        let prefixer = PathPrefixer::new("");
        assert_eq!(prefixer.prefix_path("a/b.txt"), "a/b.txt");
        assert_eq!(prefixer.prefix_path(""), "");
    }

    #[test]
    fn test_prefix_is_not_idempotent() {
        let prefixer = PathPrefixer::new("root");
        let once = prefixer.prefix_path("x");
        let twice = prefixer.prefix_path(&once);
        assert_eq!(twice, "root/root/x");
    }

    #[test]
    fn test_prefix_directory_path() {
        assert_eq!(PathPrefixer::new("p1/p2").prefix_directory_path(""), "p1/p2");
        assert_eq!(PathPrefixer::new("p1").prefix_directory_path("d"), "p1/d");
        assert_eq!(PathPrefixer::new("").prefix_directory_path(""), "");
    }

    #[test]
    fn test_prefix_round_trip() {
        let prefixes = ["", "one", "level1/level2", "/slashed/"];
        let paths = ["", "file.txt", "dir/file.txt", "a/b/c/d.bin", "with space/ü.txt"];
        for prefix in prefixes {
            let prefixer = PathPrefixer::new(prefix);
            for path in paths {
                let prefixed = prefixer.prefix_path(path);
                assert_eq!(prefixer.strip_prefix(&prefixed), path, "prefix={prefix:?}");
            }
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("").unwrap(), "");
        assert_eq!(normalize_path(".").unwrap(), "");
        assert_eq!(normalize_path("/a//b/./c/").unwrap(), "a/b/c");
        assert_eq!(normalize_path("a\\b\\c.txt").unwrap(), "a/b/c.txt");
        assert_eq!(normalize_path("a/b/../c").unwrap(), "a/c");
    }

    #[test]
    fn test_normalize_path_rejects_traversal() {
        let err = normalize_path("../etc/passwd").unwrap_err();
        assert!(matches!(err, FsError::PathTraversalDetected { .. }));
        assert!(normalize_path("a/../../b").is_err());
    }

    #[test]
    fn test_normalize_path_rejects_control_chars() {
        let err = normalize_path("a/\u{0}b").unwrap_err();
        assert!(matches!(err, FsError::CorruptedPathDetected { .. }));
    }

    #[test]
    fn test_join_and_parent() {
        assert_eq!(join_path("", "x"), "x");
        assert_eq!(join_path("a/b", "x"), "a/b/x");
        assert_eq!(parent_directory("a/b/x"), "a/b");
        assert_eq!(parent_directory("x"), "");
    }

    #[test]
    fn test_encode_path_segments_keeps_separators() {
        assert_eq!(encode_path_segments("a b/c#d/e.txt"), "a%20b/c%23d/e.txt");
        assert_eq!(encode_path_segments("dir/ü.txt"), "dir/%C3%BC.txt");
        assert_eq!(encode_path_segments("plain-name_1.~"), "plain-name_1.~");
        assert_eq!(encode_path_segments(""), "");
    }

    #[test]
    fn test_decode_path_segments() {
        assert_eq!(
            decode_path_segments("a%20b/c%23d/e.txt").as_deref(),
            Some("a b/c#d/e.txt")
        );
        assert_eq!(decode_path_segments("%FF"), None);
    }

    #[test]
    fn test_cumulative_segments() {
        assert_eq!(cumulative_segments("a/b/c"), vec!["a", "a/b", "a/b/c"]);
        assert!(cumulative_segments("").is_empty());
    }
}
