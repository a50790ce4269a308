use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use crate::models::{PendingTimeMarker, TaskFile};
use chrono::Utc;
use rusqlite::Error::InvalidParameterName;

/// Log IO-related DB errors for easier diagnosis (disk full, permission denied).
/// Does not change error propagation; the caller still returns Err.
fn log_io_error_if_any(context: &str, e: &rusqlite::Error) {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = e {
        match ffi_err.code {
            ErrorCode::DiskFull => {
                error!(
                    "[DB] {}: Disk full. Free space on drive or check app data directory.",
                    context
                );
            }
            ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                error!(
                    "[DB] {}: Permission denied or read-only. Check app data directory is writable.",
                    context
                );
            }
            ErrorCode::SystemIoFailure => {
                error!("[DB] {}: I/O error. Check disk and permissions.", context);
            }
            _ => {}
        }
    }
}

/// Convert rusqlite errors to messages fit for the notification surface.
pub fn storage_error_to_user_message(e: &rusqlite::Error) -> String {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = e {
        match ffi_err.code {
            ErrorCode::DiskFull => "Local storage unavailable (Disk Full?)".to_string(),
            ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                "Local storage unavailable (Permission denied?)".to_string()
            }
            ErrorCode::SystemIoFailure => "Local storage unavailable (I/O error?)".to_string(),
            _ => format!("Local storage error: {}", e),
        }
    } else {
        format!("Local storage error: {}", e)
    }
}

/// Local durable key/value store: pending time markers and attachment blobs.
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Lock the connection, turning a poisoned mutex into a regular error.
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, rusqlite::Error> {
        self.conn.lock().map_err(|e| {
            InvalidParameterName(format!(
                "Database mutex poisoned: {}. A panic occurred while holding the lock. \
                 Please restart the application to recover.",
                e
            ))
        })
    }

    pub fn new(db_path: &str) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        // GUARD: integrity check on startup, detect corruption before init
        let integrity: String = conn
            .query_row("PRAGMA integrity_check", [], |r| r.get(0))
            .map_err(|e| InvalidParameterName(format!("Database integrity check failed: {}", e)))?;
        if integrity.to_lowercase() != "ok" {
            return Err(InvalidParameterName(format!(
                "Database corruption detected: {}",
                integrity
            )));
        }

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| {
                warn!(
                    "[DB] Failed to enable WAL mode: {}. Continuing with default journal mode.",
                    e
                );
            })
            .ok();
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "temp_store", "MEMORY");
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| {
                warn!("[DB] Failed to enable foreign keys: {}. Continuing.", e);
            })
            .ok();

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Current schema version (PRAGMA user_version). Bump when adding migrations.
    const SCHEMA_VERSION: i32 = 1;

    fn run_migrations(&self) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        let current: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

        if current < 1 {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS pending_time (
                task_id TEXT PRIMARY KEY,
                seconds INTEGER NOT NULL,
                recorded_at INTEGER NOT NULL
            )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                name TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_files_task_id ON files(task_id)",
                [],
            )?;
        }

        conn.pragma_update(None, "user_version", Self::SCHEMA_VERSION)?;
        Ok(())
    }

    /// Record (or overwrite) the unconfirmed elapsed value for a task.
    /// GUARD: explicit transaction, no partial writes
    pub fn save_pending_time(&self, task_id: &str, seconds: u64) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        let now = Utc::now().timestamp();

        conn.execute("BEGIN IMMEDIATE TRANSACTION", []).map_err(|e| {
            log_io_error_if_any("save_pending_time begin", &e);
            error!("[DB] Failed to begin transaction: {}", e);
            e
        })?;

        let result = conn.execute(
            "INSERT INTO pending_time (task_id, seconds, recorded_at)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(task_id) DO UPDATE SET
        seconds = ?2,
        recorded_at = ?3",
            params![task_id, seconds, now],
        );

        match result {
            Ok(_) => {
                conn.execute("COMMIT", []).map_err(|e| {
                    log_io_error_if_any("save_pending_time commit", &e);
                    error!("[DB] Failed to commit transaction: {}", e);
                    let _ = conn.execute("ROLLBACK", []);
                    e
                })?;
                Ok(())
            }
            Err(e) => {
                log_io_error_if_any("save_pending_time", &e);
                error!(
                    "[DB] Failed to save pending time for {}: {}. Rolling back transaction.",
                    task_id, e
                );
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    pub fn get_pending_time(&self, task_id: &str) -> SqliteResult<Option<u64>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT seconds FROM pending_time WHERE task_id = ?1",
            params![task_id],
            |row| row.get::<_, u64>(0),
        )
        .optional()
    }

    pub fn load_pending_times(&self) -> SqliteResult<Vec<PendingTimeMarker>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, seconds, recorded_at FROM pending_time ORDER BY recorded_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PendingTimeMarker {
                task_id: row.get(0)?,
                seconds: row.get(1)?,
                recorded_at: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    pub fn remove_pending_time(&self, task_id: &str) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "DELETE FROM pending_time WHERE task_id = ?1",
            params![task_id],
        )?;
        Ok(())
    }

    /// Remove the marker only if it still holds `seconds`; a newer value written
    /// by an overlapping flush stays. Returns whether a row was deleted.
    pub fn remove_pending_time_if(&self, task_id: &str, seconds: u64) -> SqliteResult<bool> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute(
            "DELETE FROM pending_time WHERE task_id = ?1 AND seconds = ?2",
            params![task_id, seconds],
        )?;
        Ok(deleted > 0)
    }

    /// Store attachment metadata and its encoded content.
    pub fn save_file(&self, task_id: &str, file: &TaskFile, content: &str) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO files (id, task_id, name, mime_type, size, content, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                file.id,
                task_id,
                file.name,
                file.mime_type,
                file.size,
                content,
                Utc::now().timestamp()
            ],
        )
        .map_err(|e| {
            log_io_error_if_any("save_file", &e);
            e
        })?;
        Ok(())
    }

    pub fn load_file_content(&self, file_id: &str) -> SqliteResult<Option<String>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT content FROM files WHERE id = ?1",
            params![file_id],
            |row| row.get::<_, String>(0),
        )
        .optional()
    }

    pub fn delete_file(&self, file_id: &str) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM files WHERE id = ?1", params![file_id])?;
        Ok(())
    }

    /// Drop every attachment owned by the given tasks. Returns rows removed.
    pub fn delete_files_for_tasks(&self, task_ids: &[String]) -> SqliteResult<usize> {
        if task_ids.is_empty() {
            return Ok(0);
        }
        let conn = self.lock_conn()?;
        let placeholders = vec!["?"; task_ids.len()].join(",");
        let sql = format!("DELETE FROM files WHERE task_id IN ({})", placeholders);
        conn.execute(&sql, rusqlite::params_from_iter(task_ids.iter()))
    }

    /// Metadata of every stored attachment, oldest first, paired with its task id.
    pub fn load_files(&self) -> SqliteResult<Vec<(String, TaskFile)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, id, name, mime_type, size FROM files ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(1)?;
            Ok((
                row.get::<_, String>(0)?,
                TaskFile {
                    url: file_storage_key(&id),
                    id,
                    name: row.get(2)?,
                    mime_type: row.get(3)?,
                    size: row.get(4)?,
                },
            ))
        })?;
        rows.collect()
    }
}

/// Storage key exposed as `TaskFile::url`.
pub fn file_storage_key(file_id: &str) -> String {
    format!("file_{}", file_id)
}
