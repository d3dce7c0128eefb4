use crate::error::{Error, StoreContext};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA_VERSION: i64 = 1;

/// The index database. Every public operation holds the connection lock for
/// its whole critical section; internal helpers take `&Connection` so no call
/// path re-enters the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, Error> {
        let conn = Connection::open(path).during("open")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().during("open")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, Error> {
        configure_pragmas(&conn)?;
        migrate_schema(&conn)?;
        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// A panic while holding the lock leaves no open transaction behind
    /// (rusqlite rolls back on drop), so a poisoned lock is still usable.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the raw connection under the store lock.
    pub fn with_connection<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Connection) -> R,
    {
        let conn = self.lock();
        f(&conn)
    }

    pub fn truncate_all(&self) -> Result<(), Error> {
        self.lock()
            .execute_batch(
                "DELETE FROM files;
                 DELETE FROM favorites;
                 DELETE FROM ignore_folders;
                 DELETE FROM folders_to_index;
                 DELETE FROM scan_history;",
            )
            .during("truncate_all")?;
        debug!("All tables truncated");
        Ok(())
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), Error> {
    // journal_mode returns a row, so it cannot go through execute_batch on every build.
    let _mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .during("configure_pragmas")?;
    conn.execute_batch(
        "PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -16000;
         PRAGMA busy_timeout = 5000;",
    )
    .during("configure_pragmas")?;
    debug!("SQLite pragmas configured (WAL mode, 16MB cache)");
    Ok(())
}

fn migrate_schema(conn: &Connection) -> Result<(), Error> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .during("migrate_schema")?;
    if version > SCHEMA_VERSION {
        return Err(Error::Other(format!(
            "database schema version {} is newer than supported version {}",
            version, SCHEMA_VERSION
        )));
    }

    conn.execute_batch(include_str!("schema.sql"))
        .during("migrate_schema")?;
    debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_schema() {
        let db = Database::open_in_memory().unwrap();
        let tables: Vec<String> = db.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<Vec<_>, _>>()
                .unwrap()
        });
        for expected in ["favorites", "files", "folders_to_index", "ignore_folders", "scan_history"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let path = path.to_str().unwrap();
        Database::open(path).unwrap();
        let db = Database::open(path).unwrap();
        let version: i64 = db.with_connection(|c| c.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap());
        assert_eq!(version, SCHEMA_VERSION);
    }
}
