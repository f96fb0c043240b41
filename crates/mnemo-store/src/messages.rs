use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use serde::Serialize;

use mnemo_core::Role;

use crate::database::Database;
use crate::error::StoreError;
use crate::fts::{self, RankedMessage};
use crate::row_helpers::{escape_like, get, get_opt, parse_enum};

pub(crate) const MESSAGE_COLUMNS: &str =
    "id, role, content, timestamp, session_id, is_summarization, token_count";

/// A persisted chat message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    pub session_id: Option<String>,
    pub is_summarization: bool,
    pub token_count: Option<i64>,
}

/// A message to be saved.
#[derive(Clone, Debug)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub session_id: Option<String>,
    pub is_summarization: bool,
    pub token_count: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            session_id: None,
            is_summarization: false,
            token_count: None,
            timestamp: None,
        }
    }

    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.token_count = Some(i64::from(tokens));
        self
    }

    pub fn in_session(mut self, session_id: Option<impl Into<String>>) -> Self {
        self.session_id = session_id.map(Into::into);
        self
    }

    pub fn summarization(mut self, flag: bool) -> Self {
        self.is_summarization = flag;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Result of a save. Summarization messages are never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { id: i64 },
    Skipped,
}

/// Smallest and largest message ids, `None` when the table is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IdRange {
    pub min_id: Option<i64>,
    pub max_id: Option<i64>,
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> Result<StoredMessage, StoreError> {
    let role: String = get(row, 1, "messages", "role")?;
    let flag: Option<i64> = get_opt(row, 5, "messages", "is_summarization")?;
    Ok(StoredMessage {
        id: get(row, 0, "messages", "id")?,
        role: parse_enum(&role, "messages", "role")?,
        content: get(row, 2, "messages", "content")?,
        timestamp: get(row, 3, "messages", "timestamp")?,
        session_id: get_opt(row, 4, "messages", "session_id")?,
        is_summarization: flag.unwrap_or(0) != 0,
        token_count: get_opt(row, 6, "messages", "token_count")?,
    })
}

pub(crate) fn collect_messages(
    stmt: &mut rusqlite::Statement<'_>,
    params: impl rusqlite::Params,
) -> Result<Vec<StoredMessage>, StoreError> {
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_message(row)?);
    }
    Ok(out)
}

pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a message. Summarization messages are skipped without touching the database.
    pub fn insert(&self, msg: &NewMessage) -> Result<SaveOutcome, StoreError> {
        if msg.is_summarization {
            return Ok(SaveOutcome::Skipped);
        }
        let timestamp = msg
            .timestamp
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true));

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (role, content, session_id, is_summarization, token_count, timestamp)
                 VALUES (?1, ?2, ?3, 0, ?4, COALESCE(?5, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))",
                rusqlite::params![
                    msg.role.as_str(),
                    msg.content,
                    msg.session_id,
                    msg.token_count,
                    timestamp,
                ],
            )?;
            Ok(SaveOutcome::Saved {
                id: conn.last_insert_rowid(),
            })
        })
    }

    /// Messages in chronological order, optionally restricted to one session.
    pub fn list(
        &self,
        limit: u32,
        offset: u32,
        session_id: Option<&str>,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (?1 IS NULL OR session_id = ?1)
                 ORDER BY timestamp ASC, id ASC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            collect_messages(&mut stmt, rusqlite::params![session_id, limit, offset])
        })
    }

    /// Case-insensitive substring search, newest first.
    pub fn search_substring(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let pattern = format!("%{}%", escape_like(query));
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE content LIKE ?1 ESCAPE '\\'
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            collect_messages(&mut stmt, rusqlite::params![pattern, limit])
        })
    }

    /// Relevance-ranked full-text search. Falls back to substring search
    /// (rank 0) when the index is missing or the query is rejected.
    pub fn search_relevant(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<RankedMessage>, StoreError> {
        if self.db.fts_enabled() {
            match self.db.with_conn(|conn| fts::search(conn, query, limit)) {
                Ok(hits) => return Ok(hits),
                Err(e) => {
                    tracing::warn!(error = %e, "full-text search failed, using substring scan")
                }
            }
        }
        Ok(self
            .search_substring(query, limit)?
            .into_iter()
            .map(|message| RankedMessage { message, rank: 0.0 })
            .collect())
    }

    /// Re-index the full-text table. Errors when full-text search is unavailable.
    pub fn rebuild_index(&self) -> Result<usize, StoreError> {
        if !self.db.fts_enabled() {
            return Err(StoreError::Unavailable("full-text index is disabled".into()));
        }
        self.db.with_conn(fts::rebuild)
    }

    /// Delete every message. Returns the number of rows removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| Ok(conn.execute("DELETE FROM messages", [])?))
    }

    pub fn count(&self, session_id: Option<&str>) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE (?1 IS NULL OR session_id = ?1)",
                [session_id],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
    }

    /// The `count` newest messages, returned oldest first.
    pub fn recent(
        &self,
        count: u32,
        session_id: Option<&str>,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let mut messages = self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (?1 IS NULL OR session_id = ?1)
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            collect_messages(&mut stmt, rusqlite::params![session_id, count])
        })?;
        messages.reverse();
        Ok(messages)
    }

    /// Messages with `min_id <= id <= max_id`, by id.
    pub fn by_id_range(&self, min_id: i64, max_id: i64) -> Result<Vec<StoredMessage>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id >= ?1 AND id <= ?2 ORDER BY id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            collect_messages(&mut stmt, [min_id, max_id])
        })
    }

    pub fn id_range(&self) -> Result<IdRange, StoreError> {
        self.db.with_conn(|conn| {
            let range = conn
                .query_row("SELECT MIN(id), MAX(id) FROM messages", [], |row| {
                    Ok(IdRange {
                        min_id: row.get(0)?,
                        max_id: row.get(1)?,
                    })
                })
                .optional()?;
            Ok(range.unwrap_or_default())
        })
    }

    /// Messages eligible for long-term memory (not summarizations).
    pub fn ltm_count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE is_summarization = 0",
                [],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
    }

    /// Sum of token counts over the long-term memory view.
    pub fn ltm_total_tokens(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            let total: Option<i64> = conn.query_row(
                "SELECT SUM(token_count) FROM messages
                 WHERE is_summarization = 0 AND token_count IS NOT NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(total.unwrap_or(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn setup() -> MessageRepo {
        MessageRepo::new(Database::in_memory().unwrap())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn saved_id(outcome: SaveOutcome) -> i64 {
        match outcome {
            SaveOutcome::Saved { id } => id,
            SaveOutcome::Skipped => panic!("message was not saved"),
        }
    }

    #[test]
    fn insert_and_read_back() {
        let repo = setup();
        let outcome = repo
            .insert(
                &NewMessage::new(Role::User, "hello")
                    .with_tokens(2)
                    .in_session(Some("s1")),
            )
            .unwrap();
        let id = saved_id(outcome);
        let msg = repo.by_id_range(id, id).unwrap().remove(0);
        assert_eq!(msg.id, id);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.session_id.as_deref(), Some("s1"));
        assert_eq!(msg.token_count, Some(2));
        assert!(!msg.is_summarization);
    }

    #[test]
    fn ids_increase() {
        let repo = setup();
        let a = saved_id(repo.insert(&NewMessage::new(Role::User, "a")).unwrap());
        let b = saved_id(repo.insert(&NewMessage::new(Role::User, "b")).unwrap());
        assert!(b > a);
    }

    #[test]
    fn summarization_is_skipped() {
        let repo = setup();
        let outcome = repo
            .insert(&NewMessage::new(Role::Assistant, "summary").summarization(true))
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Skipped);
        assert_eq!(repo.count(None).unwrap(), 0);
    }

    #[test]
    fn caller_timestamp_orders_list() {
        let repo = setup();
        repo.insert(&NewMessage::new(Role::User, "later").at(at(10))).unwrap();
        repo.insert(&NewMessage::new(Role::User, "earlier").at(at(0))).unwrap();

        let msgs = repo.list(100, 0, None).unwrap();
        let contents: Vec<_> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["earlier", "later"]);
        assert_eq!(msgs[0].timestamp, "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn list_by_session_with_paging() {
        let repo = setup();
        for i in 0..5 {
            let session = if i % 2 == 0 { Some("even") } else { Some("odd") };
            repo.insert(&NewMessage::new(Role::User, format!("m{i}")).in_session(session).at(at(i)))
                .unwrap();
        }
        let even = repo.list(100, 0, Some("even")).unwrap();
        assert_eq!(even.len(), 3);
        let page = repo.list(2, 1, None).unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2"]);
        assert_eq!(repo.count(Some("odd")).unwrap(), 2);
        assert_eq!(repo.count(None).unwrap(), 5);
    }

    #[test]
    fn substring_search_escapes_wildcards() {
        let repo = setup();
        repo.insert(&NewMessage::new(Role::User, "100% sure").at(at(0))).unwrap();
        repo.insert(&NewMessage::new(Role::User, "1000 things").at(at(1))).unwrap();
        repo.insert(&NewMessage::new(Role::User, "Also 100% Certain").at(at(2))).unwrap();

        let hits = repo.search_substring("100%", 50).unwrap();
        let contents: Vec<_> = hits.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Also 100% Certain", "100% sure"]);
    }

    #[test]
    fn relevant_search_uses_index() {
        let repo = setup();
        repo.insert(&NewMessage::new(Role::User, "planning a trip to Lisbon")).unwrap();
        repo.insert(&NewMessage::new(Role::Assistant, "Lisbon has great trams")).unwrap();
        repo.insert(&NewMessage::new(Role::User, "unrelated")).unwrap();

        let hits = repo.search_relevant("lisbon", 20).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn relevant_search_without_index_falls_back() {
        let repo = MessageRepo::new(Database::in_memory_without_fts().unwrap());
        repo.insert(&NewMessage::new(Role::User, "planning a trip to Lisbon")).unwrap();
        repo.insert(&NewMessage::new(Role::User, "unrelated")).unwrap();

        let hits = repo.search_relevant("Lisbon", 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rank, 0.0);
        assert!(matches!(repo.rebuild_index(), Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn rebuild_index_counts_rows() {
        let repo = setup();
        repo.insert(&NewMessage::new(Role::User, "a")).unwrap();
        repo.insert(&NewMessage::new(Role::User, "b")).unwrap();
        assert_eq!(repo.rebuild_index().unwrap(), 2);
        assert_eq!(repo.rebuild_index().unwrap(), 2);
    }

    #[test]
    fn clear_reports_deleted_count() {
        let repo = setup();
        assert_eq!(repo.clear().unwrap(), 0);
        repo.insert(&NewMessage::new(Role::User, "a")).unwrap();
        repo.insert(&NewMessage::new(Role::User, "b")).unwrap();
        assert_eq!(repo.clear().unwrap(), 2);
        assert_eq!(repo.count(None).unwrap(), 0);
        assert!(repo.search_relevant("a", 10).unwrap().is_empty());
    }

    #[test]
    fn recent_returns_oldest_first() {
        let repo = setup();
        for i in 0..5 {
            repo.insert(&NewMessage::new(Role::User, format!("m{i}")).at(at(i))).unwrap();
        }
        let recent = repo.recent(3, None).unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn id_range_and_by_range() {
        let repo = setup();
        assert_eq!(repo.id_range().unwrap(), IdRange::default());
        for i in 0..4 {
            repo.insert(&NewMessage::new(Role::User, format!("m{i}"))).unwrap();
        }
        let range = repo.id_range().unwrap();
        assert_eq!(range.min_id, Some(1));
        assert_eq!(range.max_id, Some(4));
        let mid = repo.by_id_range(2, 3).unwrap();
        assert_eq!(mid.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn ltm_totals_ignore_untokenized_rows() {
        let repo = setup();
        repo.insert(&NewMessage::new(Role::User, "a").with_tokens(10)).unwrap();
        repo.insert(&NewMessage::new(Role::User, "b")).unwrap();
        repo.insert(&NewMessage::new(Role::User, "c").with_tokens(5)).unwrap();
        assert_eq!(repo.ltm_count().unwrap(), 3);
        assert_eq!(repo.ltm_total_tokens().unwrap(), 15);
    }
}
