//! The backup catalog: an embedded SQLite store recording every session
//! and the file manifest it produced.
//!
//! Two tables (`backup_sessions`, `file_hashes`), a one-shot
//! `backup_folder` column migration for catalogs predating it, and a
//! folder-lookup that falls back from an exact match to a substring
//! match for folders moved outside their original destination root.

use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::core::model::{BackupMode, ManifestEntry, Session, SessionStatus};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("catalog lock at {0} held by another process")]
    Locked(PathBuf),
    #[error("I/O error on catalog lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed row in catalog: {0}")]
    Malformed(String),
}

type Result<T> = std::result::Result<T, CatalogError>;

/// Holds the catalog's cross-process advisory lock for as long as the
/// owning `Catalog` lives. Released on drop; the empty lock file itself
/// is left in place (cheap, avoids a race re-creating it).
struct CatalogLock {
    _guard: fd_lock::RwLockWriteGuard<'static, File>,
}

impl CatalogLock {
    fn acquire(lock_path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(lock_path)
            .map_err(|source| CatalogError::Lock {
                path: lock_path.to_path_buf(),
                source,
            })?;

        // Leaked for the process's lifetime so the guard (which borrows
        // the RwLock) can live inside this struct without self-reference
        // gymnastics. One leaked lock per catalog open, bounded by how
        // many catalogs a single process opens — fine for a CLI.
        let lock: &'static mut fd_lock::RwLock<File> = Box::leak(Box::new(fd_lock::RwLock::new(file)));

        let guard = lock.try_write().map_err(|_| CatalogError::Locked(lock_path.to_path_buf()))?;
        Ok(CatalogLock { _guard: guard })
    }
}

/// A connection to one source's backup catalog, holding the exclusive
/// process lock for its lifetime.
pub struct Catalog {
    conn: Connection,
    _lock: CatalogLock,
}

impl Catalog {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CatalogError::Lock {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let lock_path = db_path.with_extension("lock");
        let lock = CatalogLock::acquire(&lock_path)?;

        let conn = Connection::open(db_path)?;
        let catalog = Catalog { conn, _lock: lock };
        catalog.init_schema()?;
        Ok(catalog)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let lock_path = std::env::temp_dir().join(format!(
            "snapkeep-test-{}-{}.lock",
            std::process::id(),
            rand::random::<u64>()
        ));
        let lock = CatalogLock::acquire(&lock_path)?;
        let conn = Connection::open_in_memory()?;
        let catalog = Catalog { conn, _lock: lock };
        catalog.init_schema()?;
        Ok(catalog)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS backup_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_path TEXT NOT NULL,
                dest_path TEXT NOT NULL,
                mode TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                status TEXT NOT NULL DEFAULT 'running',
                files_total INTEGER NOT NULL DEFAULT 0,
                files_copied INTEGER NOT NULL DEFAULT 0,
                files_skipped INTEGER NOT NULL DEFAULT 0,
                bytes_copied INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                backup_folder TEXT
            );
            CREATE TABLE IF NOT EXISTS file_hashes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                relative_path TEXT NOT NULL,
                file_hash TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                modified_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES backup_sessions(id)
            );
            CREATE INDEX IF NOT EXISTS idx_file_hashes_path ON file_hashes(relative_path);
            CREATE INDEX IF NOT EXISTS idx_file_hashes_session ON file_hashes(session_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_source ON backup_sessions(source_path);
            CREATE INDEX IF NOT EXISTS idx_sessions_folder ON backup_sessions(backup_folder);",
        )?;

        // One-shot migration: older catalogs predate the backup_folder column.
        let mut stmt = self.conn.prepare("PRAGMA table_info(backup_sessions)")?;
        let has_folder_column = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(std::result::Result::ok)
            .any(|name| name == "backup_folder");
        drop(stmt);
        if !has_folder_column {
            self.conn
                .execute("ALTER TABLE backup_sessions ADD COLUMN backup_folder TEXT", [])?;
        }

        Ok(())
    }

    pub fn create_session(
        &self,
        source: &str,
        dest: &str,
        mode: BackupMode,
        backup_folder: &str,
    ) -> Result<i64> {
        let now = Local::now();
        self.conn.execute(
            "INSERT INTO backup_sessions
                (source_path, dest_path, mode, started_at, status, backup_folder)
             VALUES (?1, ?2, ?3, ?4, 'running', ?5)",
            params![source, dest, mode.as_str(), now.to_rfc3339(), backup_folder],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Partial update of progress counters; fields left `None` are untouched.
    pub fn update_session_progress(
        &self,
        session_id: i64,
        files_total: Option<i64>,
        files_copied: Option<i64>,
        files_skipped: Option<i64>,
        bytes_copied: Option<i64>,
    ) -> Result<()> {
        let mut clauses = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(v) = files_total {
            clauses.push("files_total = ?");
            values.push(Box::new(v));
        }
        if let Some(v) = files_copied {
            clauses.push("files_copied = ?");
            values.push(Box::new(v));
        }
        if let Some(v) = files_skipped {
            clauses.push("files_skipped = ?");
            values.push(Box::new(v));
        }
        if let Some(v) = bytes_copied {
            clauses.push("bytes_copied = ?");
            values.push(Box::new(v));
        }
        if clauses.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE backup_sessions SET {} WHERE id = ?",
            clauses.join(", ")
        );
        values.push(Box::new(session_id));
        let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        self.conn.execute(&sql, params.as_slice())?;
        Ok(())
    }

    pub fn complete_session(
        &self,
        session_id: i64,
        status: SessionStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE backup_sessions SET completed_at = ?1, status = ?2, error_message = ?3 WHERE id = ?4",
            params![Local::now().to_rfc3339(), status.as_str(), error_message, session_id],
        )?;
        Ok(())
    }

    pub fn get_last_session(&self, source: &str, mode: Option<BackupMode>) -> Result<Option<Session>> {
        let mut stmt = if mode.is_some() {
            self.conn.prepare(
                "SELECT * FROM backup_sessions
                 WHERE source_path = ?1 AND mode = ?2 AND status = 'completed'
                 ORDER BY completed_at DESC LIMIT 1",
            )?
        } else {
            self.conn.prepare(
                "SELECT * FROM backup_sessions
                 WHERE source_path = ?1 AND status = 'completed'
                 ORDER BY completed_at DESC LIMIT 1",
            )?
        };

        let session = if let Some(mode) = mode {
            stmt.query_row(params![source, mode.as_str()], row_to_session)
                .optional()?
        } else {
            stmt.query_row(params![source], row_to_session).optional()?
        };
        session.transpose().map_err(Into::into)
    }

    pub fn get_recent_sessions(&self, limit: i64) -> Result<Vec<Session>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM backup_sessions ORDER BY started_at DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit], row_to_session)?;
        collect_sessions(rows)
    }

    /// Identify the session that produced `backup_folder`: exact match
    /// first, then a substring match for legacy/moved folders.
    pub fn get_session_by_folder(&self, backup_folder: &str) -> Result<Option<Session>> {
        let folder_name = Path::new(backup_folder)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| backup_folder.to_string());

        let mut exact = self
            .conn
            .prepare("SELECT * FROM backup_sessions WHERE backup_folder = ?1")?;
        if let Some(session) = exact
            .query_row(params![folder_name], row_to_session)
            .optional()?
        {
            return session.map(Some).map_err(Into::into);
        }
        drop(exact);

        let mut fuzzy = self
            .conn
            .prepare("SELECT * FROM backup_sessions WHERE backup_folder LIKE ?1")?;
        let pattern = format!("%{}%", folder_name);
        let session = fuzzy
            .query_row(params![pattern], row_to_session)
            .optional()?;
        session.transpose().map_err(Into::into)
    }

    /// Completed sessions for `source`, newest first, optionally bounded
    /// to those started before `before`. Used to build a restore chain.
    pub fn get_sessions_history(
        &self,
        source: &str,
        before: Option<DateTime<Local>>,
    ) -> Result<Vec<Session>> {
        let rows = if let Some(before) = before {
            let mut stmt = self.conn.prepare(
                "SELECT * FROM backup_sessions
                 WHERE source_path = ?1 AND status = 'completed' AND started_at < ?2
                 ORDER BY started_at DESC",
            )?;
            let sessions = stmt
                .query_map(params![source, before.to_rfc3339()], row_to_session)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            sessions
        } else {
            let mut stmt = self.conn.prepare(
                "SELECT * FROM backup_sessions
                 WHERE source_path = ?1 AND status = 'completed'
                 ORDER BY started_at DESC",
            )?;
            let sessions = stmt
                .query_map(params![source], row_to_session)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            sessions
        };
        rows.into_iter().collect::<Result<Vec<_>>>()
    }

    pub fn store_file_hash(&self, session_id: i64, entry: &ManifestEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO file_hashes (session_id, relative_path, file_hash, file_size, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                entry.relative_path,
                entry.file_hash,
                entry.file_size,
                entry.modified_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn store_file_hashes_batch(&mut self, session_id: i64, entries: &[ManifestEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO file_hashes (session_id, relative_path, file_hash, file_size, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    session_id,
                    entry.relative_path,
                    entry.file_hash,
                    entry.file_size,
                    entry.modified_at.to_rfc3339()
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_file_hash(&self, session_id: i64, relative_path: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT file_hash FROM file_hashes WHERE session_id = ?1 AND relative_path = ?2",
                params![session_id, relative_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// All manifest entries of a session, keyed by relative path — the
    /// "reference files" a change detector compares new files against.
    pub fn get_session_files(&self, session_id: i64) -> Result<HashMap<String, ManifestEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT relative_path, file_hash, file_size, modified_at FROM file_hashes WHERE session_id = ?1",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            let relative_path: String = row.get(0)?;
            let file_hash: String = row.get(1)?;
            let file_size: i64 = row.get(2)?;
            let modified_at: String = row.get(3)?;
            Ok((relative_path, file_hash, file_size, modified_at))
        })?;

        let mut map = HashMap::new();
        for row in rows {
            let (relative_path, file_hash, file_size, modified_at) = row?;
            let modified_at = parse_rfc3339(&modified_at)?;
            map.insert(
                relative_path.clone(),
                ManifestEntry {
                    relative_path,
                    file_hash,
                    file_size,
                    modified_at,
                },
            );
        }
        Ok(map)
    }

    pub fn has_full_backup(&self, source: &str) -> Result<bool> {
        Ok(self.get_last_session(source, Some(BackupMode::Full))?.is_some())
    }

    pub fn has_any_backup(&self, source: &str) -> Result<bool> {
        Ok(self.get_last_session(source, None)?.is_some())
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| CatalogError::Malformed(format!("bad timestamp {s:?}: {e}")))
}

fn row_to_session(row: &Row) -> rusqlite::Result<std::result::Result<Session, CatalogError>> {
    let build = || -> Result<Session> {
        let mode_str: String = row.get("mode")?;
        let status_str: String = row.get("status")?;
        let started_at: String = row.get("started_at")?;
        let completed_at: Option<String> = row.get("completed_at")?;

        Ok(Session {
            id: row.get("id")?,
            source_path: row.get("source_path")?,
            dest_path: row.get("dest_path")?,
            mode: mode_str
                .parse()
                .map_err(|e| CatalogError::Malformed(format!("{e}")))?,
            started_at: parse_rfc3339(&started_at)?,
            completed_at: completed_at.map(|s| parse_rfc3339(&s)).transpose()?,
            status: status_str
                .parse()
                .map_err(|e| CatalogError::Malformed(format!("{e}")))?,
            files_total: row.get("files_total")?,
            files_copied: row.get("files_copied")?,
            files_skipped: row.get("files_skipped")?,
            bytes_copied: row.get("bytes_copied")?,
            error_message: row.get("error_message")?,
            backup_folder: row.get("backup_folder")?,
        })
    };
    Ok(build())
}

fn collect_sessions(
    rows: impl Iterator<Item = rusqlite::Result<std::result::Result<Session, CatalogError>>>,
) -> Result<Vec<Session>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row??);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::SessionStatus;

    fn sample_entry(path: &str) -> ManifestEntry {
        ManifestEntry {
            relative_path: path.to_string(),
            file_hash: "deadbeef".to_string(),
            file_size: 42,
            modified_at: Local::now(),
        }
    }

    #[test]
    fn create_and_complete_session_roundtrip() {
        let catalog = Catalog::open_in_memory().unwrap();
        let id = catalog
            .create_session("/src", "/dst", BackupMode::Full, "Completo_Lunes_1_Enero_0000")
            .unwrap();
        catalog
            .update_session_progress(id, Some(3), Some(2), Some(1), Some(100))
            .unwrap();
        catalog.complete_session(id, SessionStatus::Completed, None).unwrap();

        let session = catalog.get_last_session("/src", Some(BackupMode::Full)).unwrap().unwrap();
        assert_eq!(session.files_total, 3);
        assert_eq!(session.files_copied, 2);
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn folder_lookup_falls_back_to_substring() {
        let catalog = Catalog::open_in_memory().unwrap();
        let id = catalog
            .create_session("/src", "/dst", BackupMode::Full, "Completo_Lunes_1_Enero_0000")
            .unwrap();
        catalog.complete_session(id, SessionStatus::Completed, None).unwrap();

        let exact = catalog
            .get_session_by_folder("Completo_Lunes_1_Enero_0000")
            .unwrap()
            .unwrap();
        assert_eq!(exact.id, id);

        let fuzzy = catalog
            .get_session_by_folder("/some/other/root/Completo_Lunes_1_Enero_0000")
            .unwrap()
            .unwrap();
        assert_eq!(fuzzy.id, id);
    }

    #[test]
    fn batch_hash_storage_and_lookup() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let id = catalog
            .create_session("/src", "/dst", BackupMode::Full, "Completo_Lunes_1_Enero_0000")
            .unwrap();
        catalog
            .store_file_hashes_batch(id, &[sample_entry("a.txt"), sample_entry("b.txt")])
            .unwrap();

        let files = catalog.get_session_files(id).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains_key("a.txt"));
    }

    #[test]
    fn has_full_backup_reflects_completed_full_sessions() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(!catalog.has_full_backup("/src").unwrap());

        let id = catalog
            .create_session("/src", "/dst", BackupMode::Full, "Completo_Lunes_1_Enero_0000")
            .unwrap();
        catalog.complete_session(id, SessionStatus::Completed, None).unwrap();
        assert!(catalog.has_full_backup("/src").unwrap());
    }
}
