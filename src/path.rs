//! Remote path normalization
//!
//! Dropbox paths are absolute, slash separated and case-insensitive. Display
//! paths keep the caller's casing; cache keys are lower-cased so that case
//! variants of one path share an entry.

/// Normalize a path: absolute, no duplicate or trailing slashes, `.` and `..`
/// resolved (`..` never climbs above the root)
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Cache key for a path
pub fn cache_key(path: &str) -> String {
    normalize(path).to_lowercase()
}

/// Parent of a normalized path, `None` for the root
pub fn parent(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => Some("/".to_string()),
    }
}

/// Last component of a normalized path (`/` for the root)
pub fn base_name(path: &str) -> &str {
    if path == "/" {
        return path;
    }
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a child name onto a normalized directory path
pub fn join(dir: &str, name: &str) -> String {
    normalize(&format!("{}/{}", dir, name))
}

/// Whether `key` equals `prefix` or lies beneath it; both must be cache keys
pub fn is_within(key: &str, prefix: &str) -> bool {
    if prefix == "/" || key == prefix {
        return true;
    }
    key.len() > prefix.len() && key.starts_with(prefix) && key.as_bytes()[prefix.len()] == b'/'
}

/// Match a name against a shell-style wildcard (`*` and `?`)
pub fn matches_wildcard(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut n, mut p) = (0, 0);
    // Position of the last `*` and the name index it was tried against
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some(&'*') => {
                star = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                n += 1;
                p += 1;
            }
            _ => match star {
                Some((sp, sn)) => {
                    p = sp + 1;
                    n = sn + 1;
                    star = Some((sp, sn + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("a/b.txt"), "/a/b.txt");
        assert_eq!(normalize("/a//b/"), "/a/b");
        assert_eq!(normalize("/a/./c/../b"), "/a/b");
        assert_eq!(normalize("/../.."), "/");
    }

    #[test]
    fn test_cache_key_folds_variants() {
        let keys = ["/Dir/File.TXT", "dir/file.txt/", "//DIR/./file.txt"];
        for key in keys {
            assert_eq!(cache_key(key), "/dir/file.txt");
        }
    }

    #[test]
    fn test_parent_and_base_name() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a").as_deref(), Some("/"));
        assert_eq!(parent("/a/b/c.txt").as_deref(), Some("/a/b"));
        assert_eq!(base_name("/a/b/c.txt"), "c.txt");
        assert_eq!(base_name("/"), "/");
        assert_eq!(join("/", "x"), "/x");
        assert_eq!(join("/a", "x"), "/a/x");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/dir", "/dir"));
        assert!(is_within("/dir/file", "/dir"));
        assert!(is_within("/dir/sub/file", "/dir"));
        assert!(!is_within("/directory", "/dir"));
        assert!(!is_within("/di", "/dir"));
        assert!(is_within("/anything", "/"));
    }

    #[test]
    fn test_matches_wildcard() {
        assert!(matches_wildcard("report.pdf", "*.pdf"));
        assert!(matches_wildcard("report.pdf", "rep?rt.*"));
        assert!(matches_wildcard("a", "*"));
        assert!(matches_wildcard("", "*"));
        assert!(matches_wildcard("abcabd", "*abd"));
        assert!(!matches_wildcard("report.pdf", "*.txt"));
        assert!(!matches_wildcard("report", "report?"));
    }
}
