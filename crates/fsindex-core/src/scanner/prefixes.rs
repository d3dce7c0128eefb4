use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.` components, fold `..` into its
/// parent and strip trailing separators. Never touches the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Normalized directory prefixes: the ignore list, or the set of scan roots.
/// A path is covered when it equals a prefix or lies underneath one
/// (component-wise, so `/a/bc` is not under `/a/b`).
#[derive(Debug, Clone, Default)]
pub struct PathPrefixes {
    prefixes: Vec<PathBuf>,
}

impl PathPrefixes {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = paths
            .into_iter()
            .filter(|p| !p.as_ref().trim().is_empty())
            .map(|p| normalize_path(Path::new(p.as_ref())))
            .collect();
        Self { prefixes }
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn covers(&self, path: &Path) -> bool {
        if self.prefixes.is_empty() {
            return false;
        }
        let path = normalize_path(path);
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c/")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("/a//b")), PathBuf::from("/a/b"));
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_exact_and_nested_matches() {
        let set = PathPrefixes::new(["/home/me/node_modules", "/tmp/cache/"]);
        assert!(set.covers(Path::new("/home/me/node_modules")));
        assert!(set.covers(Path::new("/home/me/node_modules/x/y.js")));
        assert!(set.covers(Path::new("/tmp/cache")));
        assert!(!set.covers(Path::new("/home/me/node_modules_old/y.js")));
        assert!(!set.covers(Path::new("/home/me")));
    }

    #[test]
    fn test_blank_entries_are_dropped() {
        let set = PathPrefixes::new(["", "  "]);
        assert!(set.is_empty());
        assert!(!set.covers(Path::new("/anything")));
    }
}
