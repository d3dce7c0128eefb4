pub mod tracker;

use crate::config::AppConfig;
use crate::error::Error;
use crate::progress::{ScanEvent, ScanSummary};
use crate::scanner::recent::RecentFilesSource;
use crate::scanner::{PathPrefixes, ReconcileTask, WalkOptions};
use crate::storage::models::{ScanPlan, RECENT_FILES_ROOT};
use crate::storage::{BatchReport, BatchTicket, StoreHandle};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use tracing::{debug, error, info, warn};

pub use tracker::{ScanPhase, ScanTracker, Update};

struct Shared {
    tracker: Mutex<ScanTracker>,
    events: mpsc::Sender<ScanEvent>,
    store: StoreHandle,
}

impl Shared {
    fn tracker(&self) -> MutexGuard<'_, ScanTracker> {
        self.tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ScanEvent) {
        if self.events.send(event).is_err() {
            debug!("Scan event dropped: no listener");
        }
    }

    /// Events go out while the tracker lock is held so listeners see them
    /// in counter order.
    fn publish(&self, update: Update) {
        if let Some(progress) = update.progress {
            self.emit(ScanEvent::Progress(progress));
        }
        if let Some(summary) = update.finished {
            self.finish(summary);
        }
    }

    fn finish(&self, summary: ScanSummary) {
        info!(
            "Scan {} finished in {:.2}s, {} files processed",
            summary.generation,
            summary.duration.as_secs_f64(),
            summary.files_processed
        );
        if let Err(e) = self.store.record_scan(
            summary.started_at.clone(),
            summary.duration.as_secs() as i64,
            summary.files_processed as i64,
        ) {
            warn!("Could not record scan history: {}", e);
        }
        self.emit(ScanEvent::Finished(summary));
    }

    fn root_scanned(&self, generation: u64, emitted_batch: bool, files: usize) -> bool {
        let mut tracker = self.tracker();
        match tracker.root_scanned(generation, emitted_batch, files) {
            Some(update) => {
                self.publish(update);
                true
            }
            None => false,
        }
    }

    fn batch_applied(&self, report: BatchReport) {
        let mut tracker = self.tracker();
        let Some(update) = tracker.batch_applied(report.ticket.generation) else {
            return;
        };
        if let Err(e) = report.result {
            let msg = format!("Database error applying batch for {}: {}", report.root, e);
            error!("{}", msg);
            self.emit(ScanEvent::ScanError(msg));
        }
        self.publish(update);
    }

    fn scan_error(&self, generation: u64, msg: String) {
        let tracker = self.tracker();
        if tracker.generation() == generation {
            error!("{}", msg);
            self.emit(ScanEvent::ScanError(msg));
        }
    }
}

/// Fans one reconcile task per scan root out to a worker pool and joins
/// their completions with the store's batch reports.
pub struct ScanOrchestrator {
    shared: Arc<Shared>,
    pool: ThreadPool,
    reports: mpsc::Sender<BatchReport>,
    ignored_extensions: Arc<Vec<String>>,
    recent: Arc<dyn RecentFilesSource>,
}

impl ScanOrchestrator {
    pub fn new(
        store: StoreHandle,
        config: &AppConfig,
        recent: Arc<dyn RecentFilesSource>,
        events: mpsc::Sender<ScanEvent>,
    ) -> Result<Self, Error> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.max(1))
            .thread_name(|i| format!("reconcile-{}", i))
            .build()
            .map_err(|e| Error::Other(format!("failed to build worker pool: {}", e)))?;

        let shared = Arc::new(Shared {
            tracker: Mutex::new(ScanTracker::new()),
            events,
            store,
        });

        // Batch reports come back from the store thread; this thread only
        // feeds them into the tracker. It exits once every sender is gone.
        let (reports, report_rx) = mpsc::channel::<BatchReport>();
        let join_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("scan-join".into())
            .spawn(move || {
                while let Ok(report) = report_rx.recv() {
                    join_shared.batch_applied(report);
                }
            })?;

        Ok(Self {
            shared,
            pool,
            reports,
            ignored_extensions: Arc::new(config.ignored_extensions.clone()),
            recent,
        })
    }

    pub fn phase(&self) -> ScanPhase {
        self.shared.tracker().phase()
    }

    pub fn status(&self) -> String {
        self.shared.tracker().status()
    }

    /// Load a fresh plan from the store and start a cycle. `Ok(None)` if a
    /// cycle is already running.
    pub fn request_scan(&self) -> Result<Option<u64>, Error> {
        if self.phase() == ScanPhase::Scanning {
            debug!("Scan already in progress");
            return Ok(None);
        }
        let plan = self.shared.store.load_scan_plan()?;
        Ok(self.start_scan(plan))
    }

    /// Start one cycle over `plan`: one recent-files task plus one folder
    /// task per root. A no-op returning `None` while a cycle is running.
    pub fn start_scan(&self, mut plan: ScanPlan) -> Option<u64> {
        let recent_prior = plan.roots.remove(RECENT_FILES_ROOT).unwrap_or_default();
        let scan_roots = PathPrefixes::new(plan.roots.keys());
        let mut tasks = vec![ReconcileTask::Recent {
            prior: recent_prior,
        }];
        tasks.extend(
            plan.roots
                .into_iter()
                .map(|(root, prior)| ReconcileTask::Folder { root, prior }),
        );

        let generation = {
            let mut tracker = self.shared.tracker();
            let generation = tracker.begin(tasks.len())?;
            self.shared.emit(ScanEvent::Progress(tracker.status()));
            generation
        };
        info!(
            "Starting scan {}: {} roots, {} ignored folders",
            generation,
            tasks.len(),
            plan.ignore.len()
        );

        let options = Arc::new(WalkOptions {
            ignore: PathPrefixes::new(&plan.ignore),
            ignored_extensions: self.ignored_extensions.as_ref().clone(),
            scan_roots,
        });

        for task in tasks {
            let shared = Arc::clone(&self.shared);
            let options = Arc::clone(&options);
            let recent = Arc::clone(&self.recent);
            let reports = self.reports.clone();
            self.pool.spawn(move || {
                run_task(&shared, generation, task, &options, recent.as_ref(), reports)
            });
        }
        debug!("All reconcile tasks submitted");
        Some(generation)
    }

    /// Drop back to idle immediately. Work still in flight from the old
    /// cycle is discarded when it reports in.
    pub fn reset_scan_state(&self) {
        let mut tracker = self.shared.tracker();
        tracker.reset();
        info!("Scan state reset (generation {})", tracker.generation());
    }
}

fn run_task(
    shared: &Shared,
    generation: u64,
    task: ReconcileTask,
    options: &WalkOptions,
    recent: &dyn RecentFilesSource,
    reports: mpsc::Sender<BatchReport>,
) {
    let root = task.root().to_string();
    let batch = match task.run(options, recent) {
        Ok(batch) => batch,
        Err(e) => {
            // Failure still counts towards the join, with no batch behind it.
            shared.scan_error(generation, format!("Error scanning {}: {}", root, e));
            shared.root_scanned(generation, false, 0);
            return;
        }
    };

    let emit = !batch.is_empty();
    let files = batch.upserts.len();
    // Count the batch as emitted before the store can possibly report it.
    if !shared.root_scanned(generation, emit, files) {
        debug!("Dropping batch for {}: scan {} was reset", root, generation);
        return;
    }
    if !emit {
        return;
    }

    let ticket = BatchTicket { generation };
    if let Err(e) = shared.store.submit_batch(ticket, batch, reports) {
        shared.batch_applied(BatchReport {
            ticket,
            root,
            result: Err(e),
        });
    }
}
