//! Remote path handling.
//!
//! Remote paths are `/`-separated strings rooted at the storage root. They
//! never touch the local filesystem, so none of this goes through
//! `std::path`.

/// Remote path separator.
pub const SEPARATOR: char = '/';

/// Root path of a storage.
pub const ROOT: &str = "/";

/// Normalize a remote path.
///
/// - repeated separators collapse
/// - leading separator added, trailing one removed
/// - `.` segments are dropped, `..` pops a segment (no-op at the root)
/// - the empty path is the root
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }

    if segments.is_empty() {
        return ROOT.to_string();
    }

    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    out
}

/// Split a path into its non-empty segments after normalization.
pub fn segments(path: &str) -> Vec<String> {
    normalize(path)
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns true if `path` normalizes to the root.
pub fn is_root(path: &str) -> bool {
    normalize(path) == ROOT
}

/// Join a parent path and a file name into a normalized full path.
pub fn join(parent: &str, name: &str) -> String {
    normalize(&format!("{}{}{}", parent, SEPARATOR, name))
}

/// Parent of a normalized path. The root is its own parent.
pub fn parent(path: &str) -> String {
    let path = normalize(path);
    match path.rfind(SEPARATOR) {
        Some(0) | None => ROOT.to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Last segment of a path, empty for the root.
pub fn file_name(path: &str) -> String {
    let path = normalize(path);
    path.rsplit(SEPARATOR).next().unwrap_or_default().to_string()
}

/// File name extension: everything after the first dot of the base name.
///
/// Directories have no extension. `123.tar.gz` yields `tar.gz` and `.ssh`
/// yields `ssh`.
pub fn extension(name: &str, is_dir: bool) -> String {
    if is_dir {
        return String::new();
    }

    let base = name.rsplit(SEPARATOR).next().unwrap_or(name);
    base.split_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default()
}

/// Case-insensitive name comparison used for sibling lookups.
pub fn names_match(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Portion of `path` below `base`, without a leading separator.
///
/// Both arguments are normalized first. Returns `None` when `path` is not
/// inside `base`.
pub fn relative_to(path: &str, base: &str) -> Option<String> {
    let path = normalize(path);
    let base = normalize(base);

    if base == ROOT {
        return Some(path.trim_start_matches(SEPARATOR).to_string());
    }
    if path == base {
        return Some(String::new());
    }

    path.strip_prefix(&base)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .map(str::to_string)
}

/// Map a path found under a source root into the destination tree.
///
/// `source_parent` is the parent of the source root. Everything in
/// `source_path` below it is reproduced under `destination`, so the source
/// root's own name survives as a subtree of the destination.
///
/// Returns `(destination_parent, destination_path)`.
pub fn map_source_to_destination(
    source_path: &str,
    source_parent: &str,
    destination: &str,
) -> (String, String) {
    let relative = relative_to(source_path, source_parent).unwrap_or_else(|| file_name(source_path));
    let destination_path = join(destination, &relative);
    let destination_parent = parent(&destination_path);
    (destination_parent, destination_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_table() {
        let cases = [
            ("", "/"),
            (".", "/"),
            ("/./", "/"),
            ("././", "/"),
            ("/../", "/"),
            ("/", "/"),
            ("//", "/"),
            ("/abc", "/abc"),
            ("//bcd", "/bcd"),
            ("/cde/", "/cde"),
            ("/def//", "/def"),
            ("efg/", "/efg"),
            ("fgh", "/fgh"),
            ("ghi/124", "/ghi/124"),
            ("hij/124/", "/hij/124"),
            ("/ijk/124/", "/ijk/124"),
            ("/a/../b", "/b"),
            ("../../x", "/x"),
        ];

        for (input, expected) in cases {
            assert_eq!(normalize(input), expected, "normalize({:?})", input);
        }
    }

    #[test]
    fn test_join_table() {
        assert_eq!(join("/", "abc"), "/abc");
        assert_eq!(join("//", "bcd"), "/bcd");
        assert_eq!(join("/", "cde/"), "/cde");
        assert_eq!(join("/def", "abc/"), "/def/abc");
        assert_eq!(join("/efg/", "abc/"), "/efg/abc");
        assert_eq!(join("", "abc"), "/abc");
    }

    #[test]
    fn test_parent_and_file_name() {
        assert_eq!(parent("/a/b/c.txt"), "/a/b");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("/"), "/");
        assert_eq!(file_name("/a/b/c.txt"), "c.txt");
        assert_eq!(file_name("/"), "");
    }

    #[test]
    fn test_extension_table() {
        let cases = [
            ("abc.txt", "txt"),
            ("xyz.gz", "gz"),
            ("123", ""),
            ("123.tar.gz", "tar.gz"),
            (".ssh", "ssh"),
            (".gitignore", "gitignore"),
            ("github.com/ganeshrvel/one-archiver/e2e_list_test.go", "go"),
            ("one-archiver/e2e_list_test.go", "go"),
            ("e2e_list_test.go/.go.psd", "go.psd"),
        ];

        for (name, expected) in cases {
            assert_eq!(extension(name, false), expected, "extension({:?})", name);
        }
        assert_eq!(extension("photos.d", true), "");
    }

    #[test]
    fn test_names_match_ignores_case() {
        assert!(names_match("Report", "report"));
        assert!(names_match("ÄRGER.txt", "ärger.TXT"));
        assert!(!names_match("report", "reports"));
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(relative_to("/a/b/c.txt", "/a").as_deref(), Some("b/c.txt"));
        assert_eq!(relative_to("/a/b", "/").as_deref(), Some("a/b"));
        assert_eq!(relative_to("/a", "/a").as_deref(), Some(""));
        assert_eq!(relative_to("/ab/c", "/a"), None);
    }

    #[test]
    fn test_map_source_to_destination_keeps_source_name() {
        let (parent, path) = map_source_to_destination("/a/b/c.txt", "/a", "/x");
        assert_eq!(path, "/x/b/c.txt");
        assert_eq!(parent, "/x/b");

        let (parent, path) = map_source_to_destination("/a/b", "/a", "/x");
        assert_eq!(path, "/x/b");
        assert_eq!(parent, "/x");
    }

    #[test]
    fn test_map_single_file_source() {
        let (parent, path) = map_source_to_destination("/mtp-test-files/a.txt", "/mtp-test-files", "/dest");
        assert_eq!(path, "/dest/a.txt");
        assert_eq!(parent, "/dest");
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(path in "[a-z./]{0,40}") {
            let once = normalize(&path);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn prop_normalize_is_absolute_without_empty_segments(path in "[a-zA-Z0-9 ./_-]{0,60}") {
            let normalized = normalize(&path);
            prop_assert!(normalized.starts_with(SEPARATOR));
            if normalized != ROOT {
                prop_assert!(!normalized.ends_with(SEPARATOR));
                prop_assert!(!normalized.contains("//"));
            }
        }

        #[test]
        fn prop_remap_preserves_relative_tail(
            source in proptest::collection::vec("[a-z]{1,8}", 1..4),
            tail in proptest::collection::vec("[a-z]{1,8}", 0..4),
            dest in proptest::collection::vec("[a-z]{1,8}", 0..3),
        ) {
            let source_root = format!("/{}", source.join("/"));
            let source_parent = parent(&source_root);
            let mut found = source_root.clone();
            for t in &tail {
                found = join(&found, t);
            }
            let destination = format!("/{}", dest.join("/"));

            let (_, mapped) = map_source_to_destination(&found, &source_parent, &destination);
            let expected_tail = relative_to(&found, &source_parent).unwrap();
            prop_assert_eq!(mapped, join(&destination, &expected_tail));
        }
    }
}
