//! Token-budgeted paging over long-term memory.
//!
//! Qualifying rows are non-summarization messages with a known token count,
//! ordered by `(timestamp, id)`. Pages are addressed by cumulative token
//! position rather than row offset: a page holds every row whose running
//! total lies in `(offset, offset + max]`. Changing rows earlier in the order
//! shifts every later position, so an offset is only meaningful against the
//! store state that produced it.

use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;

use crate::database::Database;
use crate::error::StoreError;
use crate::messages::{row_to_message, StoredMessage};
use crate::row_helpers::get;

/// A message together with its cumulative token position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LtmMessage {
    #[serde(flatten)]
    pub message: StoredMessage,
    pub cumulative_tokens: u64,
}

/// One page of long-term memory.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LtmPage {
    pub messages: Vec<LtmMessage>,
    /// Cumulative position of the last returned row, or the requested
    /// offset when the page is empty. Pass it as the next offset.
    pub total_tokens: u64,
    pub has_more: bool,
}

impl LtmPage {
    fn empty(offset_tokens: u64) -> Self {
        Self {
            messages: Vec::new(),
            total_tokens: offset_tokens,
            has_more: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Restriction applied to the qualifying rows before positions are computed.
struct Filter {
    sql: String,
    params: Vec<Value>,
}

impl Filter {
    fn none() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Rows containing every word, case-sensitively. Binds `?1..=?n`.
    fn all_words(words: &[&str]) -> Self {
        let sql = (1..=words.len())
            .map(|i| format!(" AND instr(content, ?{i}) > 0"))
            .collect::<String>();
        Self {
            sql,
            params: words.iter().map(|w| Value::Text((*w).to_string())).collect(),
        }
    }
}

fn cumulative_cte(filter: &Filter) -> String {
    format!(
        "WITH cumulative AS (
            SELECT id, role, content, timestamp, session_id, is_summarization, token_count,
                   SUM(token_count) OVER (
                       ORDER BY timestamp ASC, id ASC
                       ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
                   ) AS cumulative_tokens
            FROM messages
            WHERE is_summarization = 0 AND token_count IS NOT NULL{}
        )",
        filter.sql
    )
}

fn to_sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn page(
    conn: &Connection,
    filter: &Filter,
    max_tokens: u64,
    offset_tokens: u64,
) -> Result<LtmPage, StoreError> {
    let cte = cumulative_cte(filter);
    let lower = to_sql_int(offset_tokens);
    let upper = lower.saturating_add(to_sql_int(max_tokens));

    // Filter words bind first; bounds follow them.
    let lower_idx = filter.params.len() + 1;
    let upper_idx = lower_idx + 1;

    let sql = format!(
        "{cte}
         SELECT id, role, content, timestamp, session_id, is_summarization, token_count, cumulative_tokens
         FROM cumulative
         WHERE cumulative_tokens > ?{lower_idx} AND cumulative_tokens <= ?{upper_idx}
         ORDER BY timestamp ASC, id ASC"
    );
    let params = filter
        .params
        .iter()
        .cloned()
        .chain([Value::Integer(lower), Value::Integer(upper)]);

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
    let mut messages = Vec::new();
    while let Some(row) = rows.next()? {
        let cumulative: i64 = get(row, 7, "messages", "cumulative_tokens")?;
        messages.push(LtmMessage {
            message: row_to_message(row)?,
            cumulative_tokens: u64::try_from(cumulative).unwrap_or(0),
        });
    }

    let total_tokens = messages.last().map_or(offset_tokens, |m| m.cumulative_tokens);

    let more_sql = format!(
        "{cte} SELECT EXISTS(SELECT 1 FROM cumulative WHERE cumulative_tokens > ?{lower_idx})"
    );
    let more_params = filter
        .params
        .iter()
        .cloned()
        .chain([Value::Integer(to_sql_int(total_tokens))]);
    let has_more: bool = conn.query_row(
        &more_sql,
        rusqlite::params_from_iter(more_params),
        |row| row.get(0),
    )?;

    Ok(LtmPage {
        messages,
        total_tokens,
        has_more,
    })
}

pub struct LtmRepo {
    db: Database,
}

impl LtmRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Next slice of long-term memory after `offset_tokens`, at most
    /// `max_tokens` wide.
    pub fn page_by_tokens(
        &self,
        max_tokens: u64,
        offset_tokens: u64,
    ) -> Result<LtmPage, StoreError> {
        self.db
            .with_conn(|conn| page(conn, &Filter::none(), max_tokens, offset_tokens))
    }

    /// Same as [`page_by_tokens`](Self::page_by_tokens), over only the rows
    /// containing every whitespace-separated word of `query`.
    pub fn search_page_by_tokens(
        &self,
        query: &str,
        max_tokens: u64,
        offset_tokens: u64,
    ) -> Result<LtmPage, StoreError> {
        let words: Vec<&str> = query.split_whitespace().collect();
        if words.is_empty() {
            return Ok(LtmPage::empty(offset_tokens));
        }
        let filter = Filter::all_words(&words);
        self.db
            .with_conn(|conn| page(conn, &filter, max_tokens, offset_tokens))
    }
}
