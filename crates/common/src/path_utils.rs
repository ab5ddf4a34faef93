//! Path utilities for the mounted namespace.
//!
//! All paths in the manifest and the metadata store are absolute,
//! slash-separated POSIX strings. Normalization is purely lexical and
//! never touches the local filesystem.

/// Lexically normalize an absolute POSIX path.
///
/// Collapses repeated slashes, removes `.` components, resolves `..`
/// components (clamped at the root), and strips trailing slashes.
///
/// ```
/// use skymount_common::clean_abs_path;
/// assert_eq!(clean_abs_path("/A/B/../C/"), "/A/C");
/// assert_eq!(clean_abs_path("//x/./y"), "/x/y");
/// assert_eq!(clean_abs_path("/.."), "/");
/// ```
pub fn clean_abs_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            c => parts.push(c),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// The parent of an absolute path; the parent of `/` is `/`.
pub fn parent_of(path: &str) -> String {
    let cleaned: String = clean_abs_path(path);
    match cleaned.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => cleaned[..idx].to_string(),
    }
}

/// The final component of an absolute path; empty for `/`.
pub fn basename(path: &str) -> String {
    let cleaned: String = clean_abs_path(path);
    match cleaned.rfind('/') {
        Some(idx) => cleaned[idx + 1..].to_string(),
        None => cleaned,
    }
}

/// Join a parent path and a child name, then normalize.
pub fn join_path(parent: &str, name: &str) -> String {
    clean_abs_path(&format!("{}/{}", parent, name))
}

/// All ancestors of a path, root first, including the path itself.
///
/// ```
/// use skymount_common::ancestors;
/// assert_eq!(ancestors("/A/B/C"), vec!["/", "/A", "/A/B", "/A/B/C"]);
/// assert_eq!(ancestors("/"), vec!["/"]);
/// ```
pub fn ancestors(path: &str) -> Vec<String> {
    let cleaned: String = clean_abs_path(path);
    if cleaned == "/" {
        return vec!["/".to_string()];
    }
    let mut result: Vec<String> = ancestors(&parent_of(&cleaned));
    result.push(cleaned);
    result
}

/// Whether a name is usable as a POSIX directory entry.
///
/// Accepts the portable filename character set (alphanumerics plus
/// `.`, `_`, `-`) and rejects the reserved names `.` and `..`.
pub fn is_posix_filename(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    name.chars()
        .all(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_collapses_dot_and_slashes() {
        assert_eq!(clean_abs_path("/a/./b//c"), "/a/b/c");
        assert_eq!(clean_abs_path("/a/b/"), "/a/b");
        assert_eq!(clean_abs_path("/"), "/");
    }

    #[test]
    fn test_clean_resolves_dotdot() {
        assert_eq!(clean_abs_path("/a/b/../c"), "/a/c");
        assert_eq!(clean_abs_path("/a/../../b"), "/b");
        assert_eq!(clean_abs_path("/../.."), "/");
    }

    #[test]
    fn test_parent_and_basename() {
        assert_eq!(parent_of("/A/B"), "/A");
        assert_eq!(parent_of("/A"), "/");
        assert_eq!(parent_of("/"), "/");
        assert_eq!(basename("/A/B"), "B");
        assert_eq!(basename("/A/"), "A");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn test_join() {
        assert_eq!(join_path("/A", "B"), "/A/B");
        assert_eq!(join_path("/", "B"), "/B");
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("/A/B/C"), vec!["/", "/A", "/A/B", "/A/B/C"]);
        assert_eq!(ancestors("/foo/bar"), vec!["/", "/foo", "/foo/bar"]);
        assert_eq!(ancestors("/"), vec!["/"]);
    }

    #[test]
    fn test_posix_filename() {
        assert!(is_posix_filename("data.txt"));
        assert!(is_posix_filename("a_b-c.1"));
        assert!(!is_posix_filename(""));
        assert!(!is_posix_filename("."));
        assert!(!is_posix_filename(".."));
        assert!(!is_posix_filename("a/b"));
        assert!(!is_posix_filename("white space"));
    }
}
