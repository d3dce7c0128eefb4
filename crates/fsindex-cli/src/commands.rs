use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "fsindex")]
#[command(about = "Index configured folders and search them by path", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile every configured folder and the recent-files list with the index
    Scan,
    /// Search indexed paths; every term must match
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
        /// Maximum rows to show (defaults to search_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// List favorite files
    Favorites,
    /// Add or remove a favorite
    Favorite {
        #[command(subcommand)]
        action: PathAction,
    },
    /// Manage folders to index
    Root {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Manage ignored folders
    Ignore {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Send a raw JSON command to the store
    Request { payload: String },
    /// Show recent scan cycles
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Show index statistics
    Stats,
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum PathAction {
    Add { path: String },
    Remove { path: String },
}

#[derive(Debug, Subcommand)]
pub enum ListAction {
    Add { path: String },
    Remove { path: String },
    List,
}
