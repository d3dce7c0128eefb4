use crate::error::Error;
use crate::scanner::prefixes::normalize_path;
use crate::storage::{CommandOutput, Database, SqlCommand, Table};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: String,
    pub worker_threads: usize,
    pub search_limit: usize,
    /// Lowercase extensions (with leading dot) the folder walk never indexes.
    pub ignored_extensions: Vec<String>,
    /// JSON dump of the OS recent-documents list, if one is available.
    pub recent_files_list: Option<PathBuf>,
    pub seed_roots: Vec<String>,
    pub seed_ignore: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "fsindex.db".to_string(),
            worker_threads: 8,
            search_limit: 1000,
            ignored_extensions: vec![".pyc".to_string()],
            recent_files_list: None,
            seed_roots: Vec::new(),
            seed_ignore: Vec::new(),
        }
    }
}

/// Load `Config.toml` (optional) layered under `FSINDEX_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("FSINDEX")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ignored_extensions")
                .with_list_parse_key("seed_roots")
                .with_list_parse_key("seed_ignore"),
        )
        .build()?;
    let mut config = builder.try_deserialize::<AppConfig>()?;
    config.ignored_extensions = normalize_extensions(&config.ignored_extensions);
    if config.worker_threads == 0 {
        config.worker_threads = AppConfig::default().worker_threads;
    }
    Ok(config)
}

/// Lowercase and dot-prefix extensions so `"PYC"` and `".pyc"` compare equal.
pub fn normalize_extensions(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty() && e != ".")
        .map(|e| if e.starts_with('.') { e } else { format!(".{}", e) })
        .collect()
}

/// Group configured scan roots under their outermost configured ancestor.
/// Keys are the roots to walk; values list every configured root folded into
/// each (the key included). Comparison is lexical and component-wise.
pub fn non_overlapping_roots(roots: &[String]) -> BTreeMap<String, Vec<String>> {
    let normalized: Vec<PathBuf> = roots.iter().map(|r| normalize_path(Path::new(r))).collect();
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (i, root) in roots.iter().enumerate() {
        let outer = (0..roots.len())
            .filter(|&j| normalized[i].starts_with(&normalized[j]))
            .min_by_key(|&j| (normalized[j].components().count(), &roots[j]))
            .unwrap_or(i);
        groups.entry(roots[outer].clone()).or_default().push(root.clone());
    }
    groups
}

/// Insert `seed_roots` and `seed_ignore` into the store. Rows already present
/// are left alone, so running this on every start is harmless.
pub fn seed_configuration(db: &Database, config: &AppConfig) -> Result<usize, Error> {
    let seeds = config
        .seed_roots
        .iter()
        .map(|p| (Table::FoldersToIndex, p))
        .chain(config.seed_ignore.iter().map(|p| (Table::IgnoreFolders, p)));

    let mut inserted = 0;
    for (table, path) in seeds {
        let cmd = SqlCommand::Insert {
            table,
            column_names: vec!["path".to_string()],
            values: vec![path.clone()],
        };
        if let CommandOutput::Affected(n) = db.execute_command(&cmd)? {
            inserted += n;
        }
    }
    if inserted > 0 {
        info!("Seeded {} configuration rows", inserted);
    }
    Ok(inserted)
}
