//! Logical path handling.
//!
//! Logical paths are `/`-separated strings relative to the root of the
//! secret store (for Vault, relative to `/v1/`). They are always kept in
//! cleaned form: no leading or trailing separator, no empty or `.`
//! segments, and `..` resolved lexically. The cleaned string is what the
//! store is queried with and what inode numbers are derived from.

/// Separator between logical path segments.
pub const SEPARATOR: char = '/';

/// Cleans a logical path.
///
/// Empty and `.` segments are dropped and `..` removes the preceding
/// segment (it is ignored at the top level). The result never starts or
/// ends with a separator; the store root is the empty string.
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    push_segments(&mut segments, path);
    segments.join("/")
}

/// Joins a child name onto a base path and cleans the result.
///
/// ```
/// use vaultfs_core::path::join;
///
/// assert_eq!(join("secret/", "app"), "secret/app");
/// assert_eq!(join("", "app/"), "app");
/// assert_eq!(join("secret/app", "../db"), "secret/db");
/// ```
pub fn join(base: &str, name: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    push_segments(&mut segments, base);
    push_segments(&mut segments, name);
    segments.join("/")
}

fn push_segments<'a>(segments: &mut Vec<&'a str>, path: &'a str) {
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_separators() {
        assert_eq!(clean("/secret/app/"), "secret/app");
        assert_eq!(clean("secret//app"), "secret/app");
        assert_eq!(clean("./secret/./app"), "secret/app");
        assert_eq!(clean(""), "");
        assert_eq!(clean("/"), "");
    }

    #[test]
    fn test_clean_resolves_parent_segments() {
        assert_eq!(clean("secret/app/../db"), "secret/db");
        assert_eq!(clean("../secret"), "secret");
        assert_eq!(clean("a/b/../../.."), "");
    }

    #[test]
    fn test_join_with_empty_base() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("", ""), "");
        assert_eq!(join("a", ""), "a");
    }

    #[test]
    fn test_join_trailing_separator_on_name() {
        // Listing names carry a trailing separator for sub-collections
        assert_eq!(join("secret", "sub/"), "secret/sub");
    }

    #[test]
    fn test_join_nested() {
        assert_eq!(join("secret/app", "db/password"), "secret/app/db/password");
    }
}
