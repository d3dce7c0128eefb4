pub mod prefixes;
pub mod recent;
pub mod walk;

use crate::error::Error;
use crate::storage::models::{IndexedFile, ScanBatch, RECENT_FILES_ROOT};
use chrono::{DateTime, Local};
use std::path::Path;
use std::time::SystemTime;

pub use prefixes::PathPrefixes;
pub use recent::{RecentEntry, RecentFilesSource};

/// Second-precision local time. Unchanged string ⇒ unchanged file.
pub const MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_modified(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(MODIFIED_FORMAT).to_string()
}

/// Walk settings shared by every task of one scan cycle.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    pub ignore: PathPrefixes,
    pub ignored_extensions: Vec<String>,
    /// Every folder root of the cycle.
    pub scan_roots: PathPrefixes,
}

impl WalkOptions {
    /// Whether some folder task of this cycle indexes `path`. The folder walk
    /// owns such files; the recent-files task leaves them alone.
    pub fn is_walked(&self, path: &Path) -> bool {
        self.scan_roots.covers(path)
            && !self.ignore.covers(path)
            && !walk::has_ignored_extension(path, &self.ignored_extensions)
    }
}

/// One unit of reconcile work: a scan root and the rows it owned before.
#[derive(Debug, Clone)]
pub enum ReconcileTask {
    Folder {
        root: String,
        prior: Vec<IndexedFile>,
    },
    Recent {
        prior: Vec<IndexedFile>,
    },
}

impl ReconcileTask {
    pub fn root(&self) -> &str {
        match self {
            ReconcileTask::Folder { root, .. } => root,
            ReconcileTask::Recent { .. } => RECENT_FILES_ROOT,
        }
    }

    pub fn run(
        &self,
        options: &WalkOptions,
        recent: &dyn RecentFilesSource,
    ) -> Result<ScanBatch, Error> {
        match self {
            ReconcileTask::Folder { root, prior } => {
                walk::reconcile_folder(root, &options.ignore, &options.ignored_extensions, prior)
            }
            ReconcileTask::Recent { prior } => {
                let entries = recent.entries()?;
                Ok(recent::reconcile_recent(&entries, prior, options))
            }
        }
    }
}
