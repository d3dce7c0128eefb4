use super::{WalkOptions, MODIFIED_FORMAT};
use crate::error::Error;
use crate::storage::models::{IndexedFile, ScanBatch, RECENT_FILES_ROOT};
use chrono::{DateTime, Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One item of the OS recent-documents list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentEntry {
    pub path: String,
    /// Either `%Y-%m-%d %H:%M:%S` local time or RFC 3339.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub is_url: bool,
}

impl RecentEntry {
    pub fn new(path: impl Into<String>, timestamp: Option<&str>) -> Self {
        let path = path.into();
        let is_url = looks_like_url(&path);
        Self {
            path,
            timestamp: timestamp.map(str::to_string),
            is_url,
        }
    }

    pub fn is_url(&self) -> bool {
        self.is_url || looks_like_url(&self.path)
    }

    /// Always `%Y-%m-%d %H:%M:%S`, so rows order correctly as strings.
    fn modified(&self, now: DateTime<Local>) -> String {
        match self.timestamp.as_deref().and_then(parse_timestamp) {
            Some(ts) => ts.format(MODIFIED_FORMAT).to_string(),
            // Undated (or unparsable) entries sort below anything opened in
            // the last ten days.
            None => (now - Duration::days(10)).format(MODIFIED_FORMAT).to_string(),
        }
    }

    /// Row for this entry, or `None` for a filesystem path that no longer resolves.
    fn to_indexed(&self, now: DateTime<Local>) -> Option<IndexedFile> {
        let size = if self.is_url() {
            0
        } else {
            match fs::metadata(&self.path) {
                Ok(m) => m.len() as i64,
                Err(_) => return None,
            }
        };
        Some(IndexedFile {
            path: self.path.clone(),
            size,
            modified: self.modified(now),
            root: RECENT_FILES_ROOT.to_string(),
        })
    }
}

/// Local wall-clock time of an RFC 3339 or naive `Y-m-d H:M[:S]` timestamp.
fn parse_timestamp(ts: &str) -> Option<NaiveDateTime> {
    let ts = ts.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(ts, fmt).ok())
}

const NAIVE_FORMATS: &[&str] = &[
    MODIFIED_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

fn looks_like_url(path: &str) -> bool {
    path.get(..4)
        .map(|p| p.eq_ignore_ascii_case("http"))
        .unwrap_or(false)
}

/// Sort newest first (undated last) and keep the first entry per path.
pub fn dedupe_recent(mut entries: Vec<RecentEntry>) -> Vec<RecentEntry> {
    let now = Local::now();
    entries.sort_by_cached_key(|e| std::cmp::Reverse(e.timestamp.as_ref().map(|_| e.modified(now))));
    let mut seen = HashSet::new();
    entries.retain(|e| seen.insert(e.path.clone()));
    entries
}

/// The external recent-documents collaborator.
pub trait RecentFilesSource: Send + Sync {
    fn entries(&self) -> Result<Vec<RecentEntry>, Error>;
}

/// For platforms without a recent-documents list.
pub struct NoRecentFiles;

impl RecentFilesSource for NoRecentFiles {
    fn entries(&self) -> Result<Vec<RecentEntry>, Error> {
        Ok(Vec::new())
    }
}

pub struct StaticRecentFiles(pub Vec<RecentEntry>);

impl RecentFilesSource for StaticRecentFiles {
    fn entries(&self) -> Result<Vec<RecentEntry>, Error> {
        Ok(self.0.clone())
    }
}

/// Reads a JSON array of [`RecentEntry`] exported by an OS-specific helper.
pub struct JsonRecentFiles {
    path: PathBuf,
}

impl JsonRecentFiles {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecentFilesSource for JsonRecentFiles {
    fn entries(&self) -> Result<Vec<RecentEntry>, Error> {
        if !self.path.exists() {
            debug!("Recent files list {} not present", self.path.display());
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.path)?;
        let entries: Vec<RecentEntry> = serde_json::from_str(&data)?;
        Ok(dedupe_recent(entries))
    }
}

/// Diff the recent-documents list against the rows the pseudo-root owned.
///
/// Recent entries are history, not a mirror: a prior row is deleted only
/// when it is missing from the new list, is not a URL, and no longer exists
/// on disk.
///
/// Entries a folder task of the same cycle walks are skipped; that task owns
/// their rows and their real modified times.
pub fn reconcile_recent(
    entries: &[RecentEntry],
    prior: &[IndexedFile],
    options: &WalkOptions,
) -> ScanBatch {
    let now = Local::now();
    let prior_modified: HashMap<&str, &str> = prior
        .iter()
        .map(|f| (f.path.as_str(), f.modified.as_str()))
        .collect();
    let listed: HashSet<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    let mut batch = ScanBatch::new(RECENT_FILES_ROOT);

    for entry in entries {
        if !entry.is_url() && options.is_walked(Path::new(&entry.path)) {
            continue;
        }
        let Some(file) = entry.to_indexed(now) else {
            continue;
        };
        if prior_modified.get(file.path.as_str()) == Some(&file.modified.as_str()) {
            continue;
        }
        batch.upserts.push(file);
    }

    for file in prior {
        if listed.contains(file.path.as_str()) || looks_like_url(&file.path) {
            continue;
        }
        if Path::new(&file.path).exists() {
            continue;
        }
        batch.deletes.push(file.path.clone());
    }

    if !batch.deletes.is_empty() {
        warn!("{} recent files no longer exist", batch.deletes.len());
    }
    debug!(
        "Recent files: {} listed, {} prior, {} to upsert, {} to delete",
        entries.len(),
        prior.len(),
        batch.upserts.len(),
        batch.deletes.len()
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::PathPrefixes;

    #[test]
    fn test_url_detection() {
        assert!(RecentEntry::new("https://example.com/doc", None).is_url());
        assert!(RecentEntry::new("HTTP://intranet/x", None).is_url());
        assert!(!RecentEntry::new("/home/me/http.txt", None).is_url());
        assert!(!RecentEntry::new("ht", None).is_url());
    }

    #[test]
    fn test_dedupe_keeps_most_recent() {
        let entries = vec![
            RecentEntry::new("/a", Some("2024-01-01 10:00:00")),
            RecentEntry::new("/b", None),
            RecentEntry::new("/a", Some("2024-03-01 10:00:00")),
        ];
        let deduped = dedupe_recent(entries);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].path, "/a");
        assert_eq!(deduped[0].timestamp.as_deref(), Some("2024-03-01 10:00:00"));
        assert_eq!(deduped[1].path, "/b");
    }

    #[test]
    fn test_missing_timestamp_is_backdated() {
        let now = Local::now();
        let modified = RecentEntry::new("https://x", None).modified(now);
        let expected = (now - Duration::days(10)).format(MODIFIED_FORMAT).to_string();
        assert_eq!(modified, expected);
    }

    #[test]
    fn test_timestamps_are_normalized() {
        let now = Local::now();
        let backdated = (now - Duration::days(10)).format(MODIFIED_FORMAT).to_string();
        let cases = [
            ("2024-02-02 09:30:00", "2024-02-02 09:30:00"),
            ("2024-02-02T09:30:00", "2024-02-02 09:30:00"),
            ("2024-02-02 09:30:00.123", "2024-02-02 09:30:00"),
            ("2024-02-02 09:30", "2024-02-02 09:30:00"),
        ];
        for (raw, expected) in cases {
            assert_eq!(RecentEntry::new("/x", Some(raw)).modified(now), expected, "{}", raw);
        }
        // Unparsable values must not sort as raw strings.
        for raw in ["02/02/2024 9:30 AM", "yesterday", ""] {
            assert_eq!(RecentEntry::new("/x", Some(raw)).modified(now), backdated, "{}", raw);
        }
    }

    #[test]
    fn test_rfc3339_is_converted_to_local_time() {
        let raw = "2024-02-02T09:30:00+00:00";
        let expected = DateTime::parse_from_rfc3339(raw)
            .unwrap()
            .with_timezone(&Local)
            .format(MODIFIED_FORMAT)
            .to_string();
        assert_eq!(RecentEntry::new("/x", Some(raw)).modified(Local::now()), expected);
    }

    #[test]
    fn test_entries_under_a_scan_root_are_left_to_the_folder_walk() {
        let dir = tempfile::tempdir().unwrap();
        let walked = dir.path().join("root/report.docx");
        let ignored = dir.path().join("root/tmp/draft.docx");
        let outside = dir.path().join("elsewhere.docx");
        fs::create_dir_all(dir.path().join("root/tmp")).unwrap();
        for p in [&walked, &ignored, &outside] {
            fs::write(p, "x").unwrap();
        }
        let options = WalkOptions {
            ignore: PathPrefixes::new([dir.path().join("root/tmp").to_string_lossy()]),
            ignored_extensions: Vec::new(),
            scan_roots: PathPrefixes::new([dir.path().join("root").to_string_lossy()]),
        };
        let entries: Vec<RecentEntry> = [&walked, &ignored, &outside]
            .iter()
            .map(|p| RecentEntry::new(p.to_string_lossy(), Some("2020-01-01 00:00:00")))
            .collect();

        let batch = reconcile_recent(&entries, &[], &options);
        let mut paths: Vec<&str> = batch.upserts.iter().map(|f| f.path.as_str()).collect();
        paths.sort();
        let mut expected = vec![ignored.to_str().unwrap(), outside.to_str().unwrap()];
        expected.sort();
        assert_eq!(paths, expected);
    }

    #[test]
    fn test_url_entries_are_indexed_without_stat() {
        let entries = vec![RecentEntry::new("https://example.com/sheet", Some("2024-05-05 12:00:00"))];
        let batch = reconcile_recent(&entries, &[], &WalkOptions::default());
        assert_eq!(batch.upserts.len(), 1);
        assert_eq!(batch.upserts[0].size, 0);
        assert_eq!(batch.upserts[0].root, RECENT_FILES_ROOT);
    }

    #[test]
    fn test_json_source_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonRecentFiles::new(dir.path().join("recent.json"));
        assert!(source.entries().unwrap().is_empty());
    }

    #[test]
    fn test_json_source_reads_entries() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("recent.json");
        fs::write(
            &list,
            r#"[{"path": "/x/report.xlsx", "timestamp": "2024-02-02 09:30:00"},
                {"path": "https://share/doc", "is_url": true}]"#,
        )
        .unwrap();
        let entries = JsonRecentFiles::new(&list).entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "/x/report.xlsx");
        assert!(entries[1].is_url());
    }
}
