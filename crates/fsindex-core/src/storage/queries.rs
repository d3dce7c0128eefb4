use super::command::Table;
use super::models::*;
use super::sqlite::Database;
use crate::config::non_overlapping_roots;
use crate::error::{Error, StoreContext};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::BTreeMap;
use tracing::debug;

/// Upper bound on upserts per transaction. Bounds lock hold time so other
/// operations can interleave between chunks of a large batch.
pub const UPSERT_CHUNK_SIZE: usize = 1000;

const FILE_COLUMNS: &str = "f.path, f.size, f.modified, f.root";

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<IndexedFile> {
    Ok(IndexedFile {
        path: row.get(0)?,
        size: row.get(1)?,
        modified: row.get(2)?,
        root: row.get(3)?,
    })
}

fn search_row_from_row(row: &Row<'_>) -> rusqlite::Result<SearchRow> {
    Ok(SearchRow {
        file: file_from_row(row)?,
        is_favorite: row.get(4)?,
    })
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(token: &str) -> String {
    let mut out = String::with_capacity(token.len() + 2);
    out.push('%');
    for ch in token.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

impl Database {
    // ── Queries ──────────────────────────────────────────────────

    /// Whitespace-split `term`; a row matches when its path contains every
    /// token, case-insensitively. Favorites first, then newest first.
    /// An empty term matches nothing.
    pub fn search(&self, term: &str, limit: Option<usize>) -> Result<Vec<SearchRow>, Error> {
        let tokens: Vec<String> = term.split_whitespace().map(like_pattern).collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let predicates: Vec<String> = (1..=tokens.len())
            .map(|i| format!("f.path LIKE ?{} ESCAPE '\\'", i))
            .collect();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {}, fav.id IS NOT NULL AS is_favorite \
             FROM files f \
             LEFT JOIN favorites fav ON fav.path = f.path \
             WHERE {} \
             ORDER BY is_favorite DESC, f.modified DESC \
             LIMIT {}",
            FILE_COLUMNS,
            predicates.join(" AND "),
            limit
        );

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql).during("search")?;
        let rows = stmt
            .query_map(params_from_iter(tokens.iter()), search_row_from_row)
            .during("search")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .during("search")?;
        debug!("Search {:?} returned {} rows", term, rows.len());
        Ok(rows)
    }

    pub fn favorites(&self) -> Result<Vec<SearchRow>, Error> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}, 1 AS is_favorite \
                 FROM files f \
                 JOIN favorites fav ON fav.path = f.path \
                 ORDER BY f.modified DESC",
                FILE_COLUMNS
            ))
            .during("favorites")?;
        let rows = stmt
            .query_map([], search_row_from_row)
            .during("favorites")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .during("favorites")?;
        Ok(rows)
    }

    pub fn files_for_root(&self, root: &str) -> Result<Vec<IndexedFile>, Error> {
        let conn = self.lock();
        files_for_root(&conn, root).during("files_for_root")
    }

    pub fn file_count(&self) -> Result<i64, Error> {
        self.lock()
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .during("file_count")
    }

    pub fn config_paths(&self, table: Table) -> Result<Vec<String>, Error> {
        let conn = self.lock();
        config_paths(&conn, table).during("config_paths")
    }

    // ── Batch application ────────────────────────────────────────

    /// Delete `batch.deletes`, then upsert `batch.upserts` in chunks of
    /// [`UPSERT_CHUNK_SIZE`]. Each chunk is its own transaction and takes the
    /// lock afresh; a failing chunk rolls back alone and aborts the rest.
    pub fn apply_batch(&self, batch: &ScanBatch) -> Result<BatchOutcome, Error> {
        let mut outcome = BatchOutcome::default();

        if !batch.deletes.is_empty() {
            let mut conn = self.lock();
            outcome.deleted = delete_paths(&mut conn, &batch.deletes).during("apply_batch")?;
            outcome.commits += 1;
        }

        for (i, chunk) in batch.upserts.chunks(UPSERT_CHUNK_SIZE).enumerate() {
            let mut conn = self.lock();
            outcome.upserted += upsert_files(&mut conn, chunk).during("apply_batch")?;
            outcome.commits += 1;
            debug!(
                "Committed chunk {} ({} files) for root {}",
                i + 1,
                chunk.len(),
                batch.root
            );
        }

        Ok(outcome)
    }

    /// Remove rows whose scan root is no longer configured. The recent-files
    /// pseudo-root is always configured.
    pub fn delete_orphan_roots(&self) -> Result<usize, Error> {
        let deleted = self
            .lock()
            .execute(
                "DELETE FROM files \
                 WHERE root != ?1 AND root NOT IN (SELECT path FROM folders_to_index)",
                params![RECENT_FILES_ROOT],
            )
            .during("delete_orphan_roots")?;
        if deleted > 0 {
            debug!("Removed {} rows belonging to unconfigured roots", deleted);
        }
        Ok(deleted)
    }

    /// Sweep orphans, then snapshot the configured roots (plus the recent-files
    /// pseudo-root), each root's prior rows, and the ignore list.
    pub fn load_scan_plan(&self) -> Result<ScanPlan, Error> {
        self.delete_orphan_roots()?;

        let conn = self.lock();
        let mut roots = BTreeMap::new();
        let configured = config_paths(&conn, Table::FoldersToIndex).during("load_scan_plan")?;
        for (root, members) in non_overlapping_roots(&configured) {
            // A nested root's rows are walked as part of its outer root.
            let mut prior = Vec::new();
            for member in &members {
                prior.extend(files_for_root(&conn, member).during("load_scan_plan")?);
            }
            if members.len() > 1 {
                debug!("{} also covers {:?}", root, members);
            }
            debug!("{}: {} prior rows", root, prior.len());
            roots.insert(root, prior);
        }
        let recent = files_for_root(&conn, RECENT_FILES_ROOT).during("load_scan_plan")?;
        roots.insert(RECENT_FILES_ROOT.to_string(), recent);
        let ignore = config_paths(&conn, Table::IgnoreFolders).during("load_scan_plan")?;

        Ok(ScanPlan { roots, ignore })
    }

    // ── Scan history ─────────────────────────────────────────────

    pub fn record_scan(
        &self,
        started_at: &str,
        duration_seconds: i64,
        files_processed: i64,
    ) -> Result<i64, Error> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO scan_history (started_at, duration_seconds, files_processed) \
             VALUES (?1, ?2, ?3)",
            params![started_at, duration_seconds, files_processed],
        )
        .during("record_scan")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn scan_history(&self, limit: usize) -> Result<Vec<ScanHistoryEntry>, Error> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, started_at, duration_seconds, files_processed \
                 FROM scan_history ORDER BY id DESC LIMIT ?1",
            )
            .during("scan_history")?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(ScanHistoryEntry {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    duration_seconds: row.get(2)?,
                    files_processed: row.get(3)?,
                })
            })
            .during("scan_history")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .during("scan_history")?;
        Ok(entries)
    }
}

fn files_for_root(conn: &Connection, root: &str) -> rusqlite::Result<Vec<IndexedFile>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM files f WHERE f.root = ?1",
        FILE_COLUMNS
    ))?;
    let files = stmt
        .query_map(params![root], file_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(files)
}

fn config_paths(conn: &Connection, table: Table) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT path FROM {} ORDER BY path",
        table.as_str()
    ))?;
    let paths = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(paths)
}

fn delete_paths(conn: &mut Connection, paths: &[String]) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    let mut deleted = 0;
    {
        let mut stmt = tx.prepare_cached("DELETE FROM files WHERE path = ?1")?;
        for path in paths {
            deleted += stmt.execute(params![path])?;
        }
    }
    tx.commit()?;
    Ok(deleted)
}

fn upsert_files(conn: &mut Connection, files: &[IndexedFile]) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    let mut count = 0;
    {
        // A folder walk always wins and takes the row over. A recent-files
        // upsert only rewrites rows the pseudo-root already owns.
        let mut stmt = tx.prepare_cached(
            "INSERT INTO files (path, size, modified, root) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(path) DO UPDATE SET \
                 size = excluded.size, \
                 modified = excluded.modified, \
                 root = excluded.root \
             WHERE excluded.root != ?5 OR files.root = ?5",
        )?;
        for file in files {
            count += stmt.execute(params![
                file.path,
                file.size,
                file.modified,
                file.root,
                RECENT_FILES_ROOT
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a_b%c"), "%a\\_b\\%c%");
        assert_eq!(like_pattern("x\\y"), "%x\\\\y%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }
}
