//! Single-writer thread for all index database access.
//!
//! The thread owns the [`Database`]; scan batches, queries and generic
//! commands all arrive as messages on one channel and run one at a time.

use super::command::{CommandOutput, SqlCommand};
use super::models::{BatchOutcome, ScanBatch, ScanHistoryEntry, ScanPlan, SearchRow};
use super::sqlite::Database;
use crate::error::Error;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, error, warn};
use uuid::Uuid;

type Reply<T> = mpsc::Sender<Result<T, Error>>;

/// Identifies the scan cycle a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTicket {
    pub generation: u64,
}

/// Sent back once a batch has been committed (or has failed).
#[derive(Debug)]
pub struct BatchReport {
    pub ticket: BatchTicket,
    pub root: String,
    pub result: Result<BatchOutcome, Error>,
}

#[derive(Debug)]
pub struct CommandReply {
    pub request_id: Uuid,
    pub result: Result<CommandOutput, Error>,
}

pub enum StoreRequest {
    ApplyBatch {
        ticket: BatchTicket,
        batch: ScanBatch,
        reply: mpsc::Sender<BatchReport>,
    },
    Command {
        request_id: Uuid,
        command: SqlCommand,
        reply: mpsc::Sender<CommandReply>,
    },
    Search {
        term: String,
        limit: Option<usize>,
        reply: Reply<Vec<SearchRow>>,
    },
    Favorites(Reply<Vec<SearchRow>>),
    LoadScanPlan(Reply<ScanPlan>),
    RecordScan {
        started_at: String,
        duration_seconds: i64,
        files_processed: i64,
    },
    ScanHistory {
        limit: usize,
        reply: Reply<Vec<ScanHistoryEntry>>,
    },
    FileCount(Reply<i64>),
    Shutdown,
}

/// Cloneable handle to the store thread.
#[derive(Clone)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreRequest>,
    thread_handle: Arc<Mutex<Option<thread::JoinHandle<()>>>>,
}

impl StoreHandle {
    pub fn spawn(db: Database) -> Result<Self, Error> {
        let (sender, receiver) = mpsc::channel::<StoreRequest>();
        let handle = thread::Builder::new()
            .name("store-worker".into())
            .spawn(move || store_loop(db, receiver))?;
        Ok(Self {
            sender,
            thread_handle: Arc::new(Mutex::new(Some(handle))),
        })
    }

    pub fn send(&self, request: StoreRequest) -> Result<(), Error> {
        self.sender.send(request).map_err(|_| Error::StoreClosed)
    }

    fn call<T>(&self, make: impl FnOnce(Reply<T>) -> StoreRequest) -> Result<T, Error> {
        let (tx, rx) = mpsc::channel();
        self.send(make(tx))?;
        rx.recv().map_err(|_| Error::StoreClosed)?
    }

    /// Queue a batch; the outcome arrives on `reply`.
    pub fn submit_batch(
        &self,
        ticket: BatchTicket,
        batch: ScanBatch,
        reply: mpsc::Sender<BatchReport>,
    ) -> Result<(), Error> {
        self.send(StoreRequest::ApplyBatch {
            ticket,
            batch,
            reply,
        })
    }

    /// Queue a generic command; the outcome arrives on `reply`.
    pub fn submit_command(
        &self,
        request_id: Uuid,
        command: SqlCommand,
        reply: mpsc::Sender<CommandReply>,
    ) -> Result<(), Error> {
        self.send(StoreRequest::Command {
            request_id,
            command,
            reply,
        })
    }

    pub fn search(&self, term: &str, limit: Option<usize>) -> Result<Vec<SearchRow>, Error> {
        self.call(|reply| StoreRequest::Search {
            term: term.to_string(),
            limit,
            reply,
        })
    }

    pub fn favorites(&self) -> Result<Vec<SearchRow>, Error> {
        self.call(StoreRequest::Favorites)
    }

    pub fn load_scan_plan(&self) -> Result<ScanPlan, Error> {
        self.call(StoreRequest::LoadScanPlan)
    }

    pub fn record_scan(&self, started_at: String, duration_seconds: i64, files_processed: i64) -> Result<(), Error> {
        self.send(StoreRequest::RecordScan {
            started_at,
            duration_seconds,
            files_processed,
        })
    }

    pub fn scan_history(&self, limit: usize) -> Result<Vec<ScanHistoryEntry>, Error> {
        self.call(|reply| StoreRequest::ScanHistory { limit, reply })
    }

    pub fn file_count(&self) -> Result<i64, Error> {
        self.call(StoreRequest::FileCount)
    }

    /// Send `Shutdown` and wait for queued work to drain.
    pub fn shutdown(&self) {
        let _ = self.sender.send(StoreRequest::Shutdown);
        if let Ok(mut guard) = self.thread_handle.lock() {
            if let Some(handle) = guard.take() {
                if let Err(e) = handle.join() {
                    error!("Store worker panicked on shutdown: {:?}", e);
                }
            }
        }
    }
}

fn store_loop(db: Database, receiver: mpsc::Receiver<StoreRequest>) {
    while let Ok(request) = receiver.recv() {
        if !process_request(&db, request) {
            break;
        }
    }
    debug!("Store worker stopped");
}

/// Returns `false` once the worker should exit.
fn process_request(db: &Database, request: StoreRequest) -> bool {
    match request {
        StoreRequest::ApplyBatch {
            ticket,
            batch,
            reply,
        } => {
            let result = db.apply_batch(&batch);
            match &result {
                Ok(outcome) => debug!(
                    "Batch for {} applied: {} upserted, {} deleted in {} commits",
                    batch.root, outcome.upserted, outcome.deleted, outcome.commits
                ),
                Err(e) => error!("Batch for {} failed: {}", batch.root, e),
            }
            let report = BatchReport {
                ticket,
                root: batch.root,
                result,
            };
            if reply.send(report).is_err() {
                warn!("Batch report dropped: receiver gone");
            }
        }
        StoreRequest::Command {
            request_id,
            command,
            reply,
        } => {
            let result = db.execute_command(&command);
            if reply.send(CommandReply { request_id, result }).is_err() {
                warn!("Reply for request {} dropped: receiver gone", request_id);
            }
        }
        StoreRequest::Search { term, limit, reply } => {
            let _ = reply.send(db.search(&term, limit));
        }
        StoreRequest::Favorites(reply) => {
            let _ = reply.send(db.favorites());
        }
        StoreRequest::LoadScanPlan(reply) => {
            let _ = reply.send(db.load_scan_plan());
        }
        StoreRequest::RecordScan {
            started_at,
            duration_seconds,
            files_processed,
        } => {
            if let Err(e) = db.record_scan(&started_at, duration_seconds, files_processed) {
                error!("{}", e);
            }
        }
        StoreRequest::ScanHistory { limit, reply } => {
            let _ = reply.send(db.scan_history(limit));
        }
        StoreRequest::FileCount(reply) => {
            let _ = reply.send(db.file_count());
        }
        StoreRequest::Shutdown => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::IndexedFile;

    #[test]
    fn test_batch_then_search_through_worker() {
        let store = StoreHandle::spawn(Database::open_in_memory().unwrap()).unwrap();
        let (tx, rx) = mpsc::channel();
        let mut batch = ScanBatch::new("/r");
        batch.upserts.push(IndexedFile {
            path: "/r/notes.md".to_string(),
            size: 3,
            modified: "2024-01-01 00:00:00".to_string(),
            root: "/r".to_string(),
        });
        store
            .submit_batch(BatchTicket { generation: 7 }, batch, tx)
            .unwrap();
        let report = rx.recv().unwrap();
        assert_eq!(report.ticket.generation, 7);
        assert_eq!(report.result.unwrap().upserted, 1);

        let rows = store.search("NOTES", None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.file_count().unwrap(), 1);
        store.shutdown();
    }

    #[test]
    fn test_calls_fail_after_shutdown() {
        let store = StoreHandle::spawn(Database::open_in_memory().unwrap()).unwrap();
        store.shutdown();
        assert!(matches!(store.file_count(), Err(Error::StoreClosed)));
    }
}
