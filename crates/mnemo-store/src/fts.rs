//! Full-text index over message content.

use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::messages::{row_to_message, StoredMessage};
use crate::row_helpers::escape_fts5_query;
use crate::schema;

/// Create the index and its sync triggers; backfill rows the index is missing.
pub fn initialize(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(schema::CREATE_FTS).map_err(|e| {
        if e.to_string().contains("no such module: fts5") {
            StoreError::Unavailable("FTS5 module not available".into())
        } else {
            StoreError::Database(format!("fts: {e}"))
        }
    })?;

    let (indexed, total): (i64, i64) = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM messages_fts), (SELECT COUNT(*) FROM messages)",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if indexed < total {
        info!(missing = total - indexed, "indexing existing messages");
        if let Err(e) = rebuild(conn) {
            warn!(error = %e, "initial full-text backfill failed");
        }
    }
    Ok(())
}

pub fn table_exists(conn: &Connection) -> Result<bool, StoreError> {
    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'messages_fts'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name.is_some())
}

/// Re-index every message. Idempotent; returns the number of rows indexed.
pub fn rebuild(conn: &Connection) -> Result<usize, StoreError> {
    let tx = conn.unchecked_transaction()?;
    let _ = tx.execute("DELETE FROM messages_fts", [])?;
    let indexed = tx.execute(
        "INSERT INTO messages_fts(rowid, content, role) SELECT id, content, role FROM messages",
        [],
    )?;
    tx.commit()?;
    Ok(indexed)
}

/// A message with its bm25 score (lower is more relevant).
#[derive(Clone, Debug, serde::Serialize)]
pub struct RankedMessage {
    #[serde(flatten)]
    pub message: StoredMessage,
    pub rank: f64,
}

/// Best-matching messages for `query`, most relevant first.
pub fn search(
    conn: &Connection,
    query: &str,
    limit: u32,
) -> Result<Vec<RankedMessage>, StoreError> {
    let expr = escape_fts5_query(query);
    if expr.is_empty() {
        return Ok(Vec::new());
    }
    let sql = "SELECT m.id, m.role, m.content, m.timestamp, m.session_id, m.is_summarization,
                      m.token_count, bm25(messages_fts) AS rank
               FROM messages_fts
               JOIN messages m ON messages_fts.rowid = m.id
               WHERE messages_fts MATCH ?1
               ORDER BY rank
               LIMIT ?2";
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(rusqlite::params![expr, limit])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(RankedMessage {
            message: row_to_message(row)?,
            rank: row.get(7)?,
        });
    }
    Ok(out)
}
