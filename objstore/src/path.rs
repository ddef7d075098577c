//! Key and path helpers.
//!
//! Keys are `/`-separated strings. A key ending in `/` names a directory
//! marker; every other key names a file.
//!
//! ```
//! use objstore::path::{scope_prefix, split};
//!
//! assert_eq!(split("data/sample.txt"), ("data/", "sample.txt"));
//! assert_eq!(scope_prefix("/backups", "data/"), Some("backups/data/".to_string()));
//! assert_eq!(scope_prefix("", ""), None);
//! ```

use crate::error::{Result, StorageError};

/// Key separator.
pub const SEPARATOR: char = '/';

/// Split a path after its last separator into `(directory, leaf)`.
///
/// The directory keeps its trailing separator; a path without one has an
/// empty directory.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind(SEPARATOR) {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    }
}

/// Join path elements and normalize the result: empty and `.` segments are
/// dropped and `..` removes the preceding segment. A leading separator on
/// the first non-empty element is kept.
pub fn clean_join(parts: &[&str]) -> String {
    let rooted = parts
        .iter()
        .find(|p| !p.is_empty())
        .is_some_and(|p| p.starts_with(SEPARATOR));

    let mut segments: Vec<&str> = Vec::new();
    for segment in parts.iter().flat_map(|p| p.split(SEPARATOR)) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Effective key prefix for a bucket scoped to `dir` under `base`.
///
/// Returns `None` when the scope is the bucket root.
pub fn scope_prefix(base: &str, dir: &str) -> Option<String> {
    let joined = clean_join(&[base, dir]);
    let trimmed = joined.trim_matches(SEPARATOR);
    if trimmed.is_empty() || trimmed == "." {
        None
    } else {
        Some(format!("{}/", trimmed))
    }
}

/// Directory marker key for `path`, or `None` for the root.
pub fn dir_key(path: &str) -> Option<String> {
    let trimmed = path.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("{}/", trimmed))
    }
}

/// Whether `key` names a directory marker.
pub fn is_dir_key(key: &str) -> bool {
    key.ends_with(SEPARATOR)
}

/// Reject keys that would escape the bucket root or cannot be stored.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidPath("empty key".to_string()));
    }
    let body = key.strip_suffix(SEPARATOR).unwrap_or(key);
    if key.starts_with(SEPARATOR)
        || key.contains('\0')
        || body
            .split(SEPARATOR)
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidPath(key.to_string()));
    }
    Ok(())
}

/// Reject a directory path that would climb out of the scope it is
/// resolved in. Leading, doubled and trailing separators and `.` segments
/// are tolerated; [`scope_prefix`] cleans them away.
pub fn validate_dir(dir: &str) -> Result<()> {
    if dir.contains('\0') || dir.split(SEPARATOR).any(|segment| segment == "..") {
        return Err(StorageError::InvalidPath(dir.to_string()));
    }
    Ok(())
}
