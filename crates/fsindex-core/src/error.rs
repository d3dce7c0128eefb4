use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scan root not found: {0}")]
    MissingRoot(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error during {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid command: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store worker has shut down")]
    StoreClosed,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}

/// Attach an operation name to a raw SQLite failure.
pub(crate) trait StoreContext<T> {
    fn during(self, operation: &'static str) -> Result<T, Error>;
}

impl<T> StoreContext<T> for Result<T, rusqlite::Error> {
    fn during(self, operation: &'static str) -> Result<T, Error> {
        self.map_err(|source| Error::Store { operation, source })
    }
}
