use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::fts;
use crate::schema;

/// Thread-safe SQLite connection wrapper.
/// Uses parking_lot::Mutex for synchronous access (rusqlite connections are not Sync).
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    fts_enabled: bool,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        let fts_enabled = initialize(&conn, true)?;

        info!(path = %path.display(), fts_enabled, "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
            fts_enabled,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::memory(true)
    }

    /// In-memory database without the full-text index, as on SQLite builds
    /// lacking FTS5. Search falls back to substring scans.
    pub fn in_memory_without_fts() -> Result<Self, StoreError> {
        Self::memory(false)
    }

    fn memory(with_fts: bool) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        let fts_enabled = initialize(&conn, with_fts)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
            fts_enabled,
        })
    }

    /// Execute a closure with the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the full-text index exists and is kept in sync by triggers.
    pub fn fts_enabled(&self) -> bool {
        self.fts_enabled
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            path: self.path.clone(),
            fts_enabled: self.fts_enabled,
        }
    }
}

/// Pragmas, tables, legacy migrations and the full-text index.
/// Returns whether full-text search is available.
fn initialize(conn: &Connection, with_fts: bool) -> Result<bool, StoreError> {
    conn.execute_batch(schema::PRAGMAS)
        .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;

    conn.execute_batch(schema::CREATE_TABLES)
        .map_err(|e| StoreError::Database(format!("schema: {e}")))?;

    migrate(conn)?;

    conn.execute_batch(schema::CREATE_LTM_INDEXES)
        .map_err(|e| StoreError::Database(format!("ltm indexes: {e}")))?;

    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .ok();
    if version.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [schema::SCHEMA_VERSION],
        )
        .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;
    }

    if !with_fts {
        return Ok(false);
    }
    match fts::initialize(conn) {
        Ok(()) => Ok(true),
        Err(e) => {
            warn!(error = %e, "full-text index unavailable, search falls back to substring scan");
            Ok(false)
        }
    }
}

/// Add columns missing from tables created by older versions.
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let columns: Vec<String> = conn
        .prepare("PRAGMA table_info(messages)")?
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;

    let mut migrated = false;
    for (column, ddl) in schema::MIGRATIONS {
        if !columns.iter().any(|c| c == column) {
            conn.execute_batch(ddl)
                .map_err(|e| StoreError::Database(format!("add column {column}: {e}")))?;
            info!(column, "migrated messages table");
            migrated = true;
        }
    }
    if migrated {
        let _ = conn.execute(schema::BACKFILL_SUMMARIZATION_FLAG, [])?;
    }
    Ok(())
}
