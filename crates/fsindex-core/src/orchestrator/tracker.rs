use crate::progress::ScanSummary;
use crate::scanner::MODIFIED_FORMAT;
use chrono::Local;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Scanning,
}

/// What a counted event changed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
    pub progress: Option<String>,
    pub finished: Option<ScanSummary>,
}

/// Completion join for one scan cycle.
///
/// A cycle is done when every root has been walked *and* every batch those
/// walks emitted has been applied; the two happen on different threads in
/// either order. Every cycle gets a fresh generation, and events stamped
/// with any other generation are discarded, so work that outlives a
/// [`reset`](ScanTracker::reset) cannot complete the next cycle.
#[derive(Debug)]
pub struct ScanTracker {
    phase: ScanPhase,
    generation: u64,
    scanned_roots: usize,
    total_roots: usize,
    batches_emitted: usize,
    batches_applied: usize,
    files_processed: usize,
    started: Option<(Instant, String)>,
}

impl Default for ScanTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanTracker {
    pub fn new() -> Self {
        Self {
            phase: ScanPhase::Idle,
            generation: 0,
            scanned_roots: 0,
            total_roots: 0,
            batches_emitted: 0,
            batches_applied: 0,
            files_processed: 0,
            started: None,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `(scanned_roots, total_roots, batches_emitted, batches_applied)`
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.scanned_roots,
            self.total_roots,
            self.batches_emitted,
            self.batches_applied,
        )
    }

    /// Start a cycle over `total_roots` roots. `None` if one is already running.
    pub fn begin(&mut self, total_roots: usize) -> Option<u64> {
        if self.phase == ScanPhase::Scanning {
            return None;
        }
        self.generation += 1;
        self.phase = ScanPhase::Scanning;
        self.scanned_roots = 0;
        self.total_roots = total_roots;
        self.batches_emitted = 0;
        self.batches_applied = 0;
        self.files_processed = 0;
        self.started = Some((
            Instant::now(),
            Local::now().format(MODIFIED_FORMAT).to_string(),
        ));
        Some(self.generation)
    }

    pub fn status(&self) -> String {
        format!("scanned {} of {} roots", self.scanned_roots, self.total_roots)
    }

    /// Force the tracker back to idle without waiting for in-flight work.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.phase = ScanPhase::Idle;
        self.scanned_roots = 0;
        self.total_roots = 0;
        self.batches_emitted = 0;
        self.batches_applied = 0;
        self.files_processed = 0;
        self.started = None;
    }

    fn is_current(&self, generation: u64, what: &str) -> bool {
        let current = self.phase == ScanPhase::Scanning && generation == self.generation;
        if !current {
            debug!(
                "Discarding stale {} from generation {} (current {})",
                what, generation, self.generation
            );
        }
        current
    }

    /// A task finished its walk. `emitted_batch` is whether it handed a batch
    /// to the store. Returns `None` for a stale generation.
    pub fn root_scanned(&mut self, generation: u64, emitted_batch: bool, files: usize) -> Option<Update> {
        if !self.is_current(generation, "root completion") {
            return None;
        }
        self.scanned_roots += 1;
        if emitted_batch {
            self.batches_emitted += 1;
        }
        self.files_processed += files;

        let progress = if self.scanned_roots == self.total_roots {
            format!("{}, processing db updates", self.status())
        } else {
            self.status()
        };
        Some(Update {
            progress: Some(progress),
            finished: self.check_complete(),
        })
    }

    /// The store committed (or failed) one batch. Returns `None` for a stale generation.
    pub fn batch_applied(&mut self, generation: u64) -> Option<Update> {
        if !self.is_current(generation, "batch report") {
            return None;
        }
        self.batches_applied += 1;
        Some(Update {
            progress: None,
            finished: self.check_complete(),
        })
    }

    fn check_complete(&mut self) -> Option<ScanSummary> {
        if self.scanned_roots != self.total_roots || self.batches_applied != self.batches_emitted {
            return None;
        }
        self.phase = ScanPhase::Idle;
        let (start, started_at) = self
            .started
            .take()
            .unwrap_or_else(|| (Instant::now(), String::new()));
        let status = format!(
            "last scanned: {}",
            Local::now().format(MODIFIED_FORMAT)
        );
        Some(ScanSummary {
            generation: self.generation,
            started_at,
            duration: start.elapsed(),
            files_processed: self.files_processed,
            status,
        })
    }
}
