use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";
const DEFAULT_LOG_FILE: &str = "./logs/fsindex.log";

/// Logging knobs read from `TRACING_LEVEL` and `LOG_FILE_PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    filter: String,
    directory: PathBuf,
    file_name: String,
}

impl LogSettings {
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup("TRACING_LEVEL")
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let log_file = lookup("LOG_FILE_PATH")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());

        let path = Path::new(&log_file);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fsindex.log".to_string());
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Self {
            filter,
            directory,
            file_name,
        }
    }
}

/// Install the console and file subscribers. Keep the guard alive for the
/// whole run or buffered file lines are lost.
pub fn init_logger() -> WorkerGuard {
    let settings = LogSettings::from_env();

    let (filter_layer, bad_filter) = match EnvFilter::try_new(&settings.filter) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(DEFAULT_FILTER), Some(e)),
    };
    let dir_error = std::fs::create_dir_all(&settings.directory).err();

    let file_appender = tracing_appender::rolling::never(&settings.directory, &settings.file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_thread_names(true)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    if let Some(e) = bad_filter {
        warn!("TRACING_LEVEL {:?} rejected ({}), using {}", settings.filter, e, DEFAULT_FILTER);
    }
    if let Some(e) = dir_error {
        warn!("Cannot create log directory {}: {}", settings.directory.display(), e);
    }
    info!(
        "Logging to {}",
        settings.directory.join(&settings.file_name).display()
    );

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s.filter, "info");
        assert_eq!(s.directory, PathBuf::from("./logs"));
        assert_eq!(s.file_name, "fsindex.log");
    }

    #[test]
    fn test_log_file_path_is_split() {
        let s = settings(&[
            ("TRACING_LEVEL", "fsindex_core=debug"),
            ("LOG_FILE_PATH", "/var/tmp/idx/scan.log"),
        ]);
        assert_eq!(s.filter, "fsindex_core=debug");
        assert_eq!(s.directory, PathBuf::from("/var/tmp/idx"));
        assert_eq!(s.file_name, "scan.log");
    }

    #[test]
    fn test_bare_file_name_logs_to_working_directory() {
        let s = settings(&[("LOG_FILE_PATH", "fsindex.log"), ("TRACING_LEVEL", " ")]);
        assert_eq!(s.directory, PathBuf::from("."));
        assert_eq!(s.file_name, "fsindex.log");
        assert_eq!(s.filter, "info");
    }
}
