/// SQL DDL for the mnemo message store.
pub const SCHEMA_VERSION: u32 = 1;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

// Timestamps are ISO-8601 UTC with milliseconds so that text order is
// chronological order.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    role TEXT NOT NULL CHECK(role IN ('user', 'assistant', 'system')),
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    session_id TEXT,
    is_summarization INTEGER NOT NULL DEFAULT 0,
    token_count INTEGER
);

CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);
"#;

/// Indexes on columns a legacy table may lack; run after [`MIGRATIONS`].
pub const CREATE_LTM_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_is_summarization ON messages(is_summarization);
CREATE INDEX IF NOT EXISTS idx_messages_token_count ON messages(token_count);
CREATE INDEX IF NOT EXISTS idx_messages_ltm_order ON messages(timestamp, id)
    WHERE is_summarization = 0 AND token_count IS NOT NULL;
"#;

/// Additive column migrations for tables created before LTM paging existed.
pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "is_summarization",
        "ALTER TABLE messages ADD COLUMN is_summarization INTEGER DEFAULT 0",
    ),
    ("token_count", "ALTER TABLE messages ADD COLUMN token_count INTEGER"),
];

pub const BACKFILL_SUMMARIZATION_FLAG: &str =
    "UPDATE messages SET is_summarization = 0 WHERE is_summarization IS NULL";

/// Full-text index over message content and role. Rowid mirrors `messages.id`.
pub const CREATE_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(content, role);

CREATE TRIGGER IF NOT EXISTS messages_fts_insert AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, content, role) VALUES (new.id, new.content, new.role);
END;

CREATE TRIGGER IF NOT EXISTS messages_fts_delete AFTER DELETE ON messages BEGIN
    DELETE FROM messages_fts WHERE rowid = old.id;
END;

CREATE TRIGGER IF NOT EXISTS messages_fts_update AFTER UPDATE ON messages BEGIN
    DELETE FROM messages_fts WHERE rowid = old.id;
    INSERT INTO messages_fts(rowid, content, role) VALUES (new.id, new.content, new.role);
END;
"#;
