//! Glob expansion helpers.

use glob::Pattern;
use rusty_gcsfs_common::GcsError;

/// Characters that start glob syntax.
const GLOB_CHARS: &[char] = &['*', '?', '[', '\\'];

/// The leading part of `pattern` that contains no glob syntax.
pub(crate) fn fixed_prefix(pattern: &str) -> &str {
    match pattern.find(GLOB_CHARS) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}

/// The directory to list for a pattern: everything up to the last `/`
/// of the fixed prefix.
pub(crate) fn listing_root(pattern: &str) -> Option<&str> {
    let prefix: &str = fixed_prefix(pattern);
    prefix.rfind('/').map(|idx| &prefix[..idx])
}

/// Compile a pattern, mapping syntax errors to invalid-argument.
pub(crate) fn compile(pattern: &str) -> Result<Pattern, GcsError> {
    Pattern::new(pattern).map_err(|e| {
        GcsError::invalid_argument(format!("malformed glob pattern '{}': {}", pattern, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_prefix() {
        assert_eq!(fixed_prefix("gs://bucket/path/*.txt"), "gs://bucket/path/");
        assert_eq!(fixed_prefix("gs://bucket/path/sub?/x"), "gs://bucket/path/sub");
        assert_eq!(fixed_prefix("gs://bucket/plain.txt"), "gs://bucket/plain.txt");
    }

    #[test]
    fn test_listing_root() {
        assert_eq!(listing_root("gs://bucket/path/*.txt"), Some("gs://bucket/path"));
        assert_eq!(
            listing_root("gs://bucket/path/subpath/file.txt"),
            Some("gs://bucket/path/subpath")
        );
        assert_eq!(listing_root("gs*"), None);
    }

    #[test]
    fn test_wildcard_crosses_separators() {
        let pattern: Pattern = compile("gs://bucket/path/*/file.txt").unwrap();
        assert!(pattern.matches("gs://bucket/path/subpath/file.txt"));

        let pattern: Pattern = compile("gs://bucket/*.txt").unwrap();
        assert!(pattern.matches("gs://bucket/deep/nested/name.txt"));
    }

    #[test]
    fn test_malformed_pattern_rejected() {
        assert!(compile("gs://bucket/[").is_err());
    }
}
