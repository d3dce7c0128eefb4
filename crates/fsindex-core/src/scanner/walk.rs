use super::{format_modified, prefixes::PathPrefixes};
use crate::error::Error;
use crate::storage::models::{IndexedFile, ScanBatch};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

pub(crate) fn has_ignored_extension(path: &Path, ignored_extensions: &[String]) -> bool {
    if ignored_extensions.is_empty() {
        return false;
    }
    match path.extension() {
        Some(ext) => {
            let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
            ignored_extensions.iter().any(|e| *e == ext)
        }
        None => false,
    }
}

/// Top-down walk of `root` that never descends into an ignored directory.
pub fn walk_entries<'a>(
    root: &'a Path,
    ignore: &'a PathPrefixes,
) -> impl Iterator<Item = walkdir::Result<DirEntry>> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(move |entry| !(entry.file_type().is_dir() && ignore.covers(entry.path())))
}

/// Walk `root` top-down and diff it against the rows it owned before.
///
/// Ignored directories are pruned before descent. Files whose modified
/// string is unchanged are skipped; everything else lands in `upserts`.
/// Prior paths not seen on this walk land in `deletes`, except those under
/// an entry the walk failed to read: an unreadable subtree is not evidence
/// that its files are gone.
pub fn reconcile_folder(
    root: &str,
    ignore: &PathPrefixes,
    ignored_extensions: &[String],
    prior: &[IndexedFile],
) -> Result<ScanBatch, Error> {
    let root_path = Path::new(root);
    if !root_path.exists() {
        return Err(Error::MissingRoot(root.to_string()));
    }
    info!("Scanning folder: {}", root);

    let prior_modified: HashMap<&str, &str> = prior
        .iter()
        .map(|f| (f.path.as_str(), f.modified.as_str()))
        .collect();
    let mut observed: HashSet<String> = HashSet::new();
    let mut unreadable: Vec<PathBuf> = Vec::new();
    let mut batch = ScanBatch::new(root);

    for entry in walk_entries(root_path, ignore) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Error walking {}: {}", root, err);
                if let Some(path) = err.path() {
                    unreadable.push(path.to_path_buf());
                }
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        if ignore.covers(path) || has_ignored_extension(path, ignored_extensions) {
            continue;
        }

        let path_str = path.to_string_lossy().into_owned();
        // Follows symlinks: a link to a file is indexed with its target's size.
        let metadata = match fs::metadata(path) {
            Ok(m) if m.is_dir() => continue,
            Ok(m) => m,
            Err(err) => {
                warn!("Error processing {}: {}", path.display(), err);
                observed.insert(path_str);
                continue;
            }
        };
        let modified = match metadata.modified() {
            Ok(t) => format_modified(t),
            Err(err) => {
                warn!("No modified time for {}: {}", path.display(), err);
                observed.insert(path_str);
                continue;
            }
        };

        if prior_modified.get(path_str.as_str()) == Some(&modified.as_str()) {
            observed.insert(path_str);
            continue;
        }

        batch.upserts.push(IndexedFile {
            path: path_str.clone(),
            size: metadata.len() as i64,
            modified,
            root: root.to_string(),
        });
        observed.insert(path_str);
    }

    batch.deletes = prior
        .iter()
        .filter(|f| !observed.contains(&f.path))
        .filter(|f| !unreadable.iter().any(|u| Path::new(&f.path).starts_with(u)))
        .map(|f| f.path.clone())
        .collect();
    batch.deletes.sort();

    debug!(
        "Completed scanning {}: {} to upsert, {} to delete",
        root,
        batch.upserts.len(),
        batch.deletes.len()
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_blacklist_is_case_insensitive() {
        let exts = vec![".pyc".to_string()];
        assert!(has_ignored_extension(Path::new("/a/b.pyc"), &exts));
        assert!(has_ignored_extension(Path::new("/a/b.PYC"), &exts));
        assert!(!has_ignored_extension(Path::new("/a/b.py"), &exts));
        assert!(!has_ignored_extension(Path::new("/a/pyc"), &exts));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("unmounted");
        let prior = vec![IndexedFile {
            path: gone.join("a.txt").to_string_lossy().into_owned(),
            size: 1,
            modified: "2024-01-01 00:00:00".to_string(),
            root: gone.to_string_lossy().into_owned(),
        }];
        let err = reconcile_folder(gone.to_str().unwrap(), &PathPrefixes::default(), &[], &prior)
            .unwrap_err();
        assert!(matches!(err, Error::MissingRoot(_)));
    }
}
