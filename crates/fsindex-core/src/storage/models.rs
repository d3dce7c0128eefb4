use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scan root owning every row that came from the recent-documents list.
pub const RECENT_FILES_ROOT: &str = "recent_files";

/// One row of the `files` table. `path` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub path: String,
    pub size: i64,
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub modified: String,
    pub root: String,
}

/// A file row joined against `favorites`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRow {
    pub file: IndexedFile,
    pub is_favorite: bool,
}

/// Upserts and deletions produced by one reconcile task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanBatch {
    pub root: String,
    pub upserts: Vec<IndexedFile>,
    pub deletes: Vec<String>,
}

impl ScanBatch {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// What `apply_batch` committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub deleted: usize,
    pub upserted: usize,
    pub commits: usize,
}

/// Configuration snapshot read once per scan cycle.
#[derive(Debug, Clone, Default)]
pub struct ScanPlan {
    /// Scan root → rows it owned before this cycle. Always contains
    /// [`RECENT_FILES_ROOT`] when produced by the store.
    pub roots: BTreeMap<String, Vec<IndexedFile>>,
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanHistoryEntry {
    pub id: i64,
    pub started_at: String,
    pub duration_seconds: i64,
    pub files_processed: i64,
}
