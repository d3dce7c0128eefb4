pub mod config;
pub mod display;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod request_bus;
pub mod scanner;
pub mod storage;

pub use config::{load_configuration, seed_configuration, AppConfig};
pub use display::{format_date, format_file_size, ResultRow};
pub use error::Error;
pub use orchestrator::{ScanOrchestrator, ScanPhase};
pub use progress::{ScanEvent, ScanSummary};
pub use request_bus::{RequestBus, RequestEvent};
pub use scanner::recent::{JsonRecentFiles, NoRecentFiles, StaticRecentFiles};
pub use scanner::{RecentEntry, RecentFilesSource};
pub use storage::{Database, StoreHandle};
