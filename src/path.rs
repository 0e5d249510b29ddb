//! Path normalization
//!
//! All overlay keys are normalized relative paths with forward slashes.
//! `.` and `..` segments are kept literally; callers own path hygiene.

/// Normalize a user-supplied relative path.
///
/// Trims surrounding whitespace, converts backslashes to forward slashes,
/// drops empty segments and rejoins. Two inputs that normalize identically
/// refer to the same overlay entry.
pub fn normalize(path: &str) -> String {
    path.trim()
        .replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
        .trim()
        .to_string()
}

/// Normalize a directory path into the prefix form used for removed
/// directories: trailing slash included, empty string for the root.
pub fn dir_prefix(path: &str) -> String {
    let cleaned = normalize(path);
    if cleaned.is_empty() {
        cleaned
    } else {
        format!("{}/", cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_backslashes_and_empty_segments() {
        assert_eq!(normalize("a\\b//c/ "), "a/b/c");
    }

    #[test]
    fn test_normalize_trims_and_strips_leading_slash() {
        assert_eq!(normalize(" /x "), "x");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("/"), "");
    }

    #[test]
    fn test_normalize_keeps_dot_segments_literally() {
        assert_eq!(normalize("a/./b"), "a/./b");
        assert_eq!(normalize("a/../b"), "a/../b");
    }

    #[test]
    fn test_normalized_inputs_are_identical_keys() {
        assert_eq!(normalize("a\\b/c"), normalize(" a/b//c "));
    }

    #[test]
    fn test_dir_prefix() {
        assert_eq!(dir_prefix("a/b"), "a/b/");
        assert_eq!(dir_prefix(""), "");
        assert_eq!(dir_prefix("/"), "");
        assert_eq!(dir_prefix("a\\b\\"), "a/b/");
    }
}
