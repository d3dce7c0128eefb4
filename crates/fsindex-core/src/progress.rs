use std::time::Duration;

/// Messages the orchestrator sends to whoever presents scan state.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Human-readable status, e.g. `"scanned 2 of 5 roots"`.
    Progress(String),
    /// One root or one batch failed; the cycle carries on.
    ScanError(String),
    /// Every root has been walked and every batch committed.
    Finished(ScanSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanSummary {
    pub generation: u64,
    /// Local time the cycle started, `%Y-%m-%d %H:%M:%S`.
    pub started_at: String,
    pub duration: Duration,
    /// Rows upserted across all roots.
    pub files_processed: usize,
    pub status: String,
}
