//! Store path and permission helpers.
//!
//! The client never validates what it sends; callers that want to reject
//! bad input before it reaches the backend use these.

use std::sync::LazyLock;

use regex_lite::Regex;

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '/';

const MAX_RELATIVE_PATH: usize = 2048;
const MAX_ABSOLUTE_PATH: usize = 3072;

static PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9/_@-]+\x00?$").expect("path pattern is valid"));

static WATCH_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@(?:introduceDomain|releaseDomain)\x00?$").expect("watch pattern is valid")
});

static PERMISSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[wrbn]\d+$").expect("permission pattern is valid"));

/// Join path segments with exactly one separator between each.
///
/// A leading separator on the first segment is kept, so
/// `join_path(&["/local", "domain"])` is `/local/domain` and
/// `join_path(&["tools", "vm"])` is `tools/vm`.
pub fn join_path(segments: &[&str]) -> String {
    let mut joined = String::new();

    for (i, segment) in segments.iter().enumerate() {
        let mut segment = *segment;
        if segments.len() > 1 {
            segment = segment.strip_suffix(PATH_SEPARATOR).unwrap_or(segment);
        }

        if i == 0 {
            joined.push_str(segment);
        } else {
            joined.push(PATH_SEPARATOR);
            joined.push_str(segment.strip_prefix(PATH_SEPARATOR).unwrap_or(segment));
        }
    }

    joined
}

/// Whether `path` is a well-formed store path.
///
/// Allowed characters are ASCII letters, digits and `-/_@`, optionally
/// followed by a single trailing NUL. Relative paths may be up to 2048
/// bytes and absolute paths up to 3072. A trailing separator (other than
/// the root `/`) and empty segments are rejected.
pub fn valid_path(path: &str) -> bool {
    let max_len = if path.starts_with(PATH_SEPARATOR) {
        MAX_ABSOLUTE_PATH
    } else {
        MAX_RELATIVE_PATH
    };
    if path.len() > max_len {
        return false;
    }

    if !PATH.is_match(path) {
        return false;
    }

    let trailing_separator = path.len() > 1 && path.ends_with(PATH_SEPARATOR);
    !trailing_separator && !path.contains("//")
}

/// Whether `path` may be watched: one of the special domain event paths or
/// a valid store path.
pub fn valid_watch_path(path: &str) -> bool {
    WATCH_PATH.is_match(path) || valid_path(path)
}

/// Whether every entry is a permission spec: one of `w`, `r`, `b`, `n`
/// followed by a domain id.
pub fn valid_permissions(permissions: &[&str]) -> bool {
    permissions.iter().all(|perm| PERMISSION.is_match(perm))
}
