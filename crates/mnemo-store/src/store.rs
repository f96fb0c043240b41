use std::path::PathBuf;

use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::database::Database;
use crate::error::StoreError;
use crate::fts::RankedMessage;
use crate::ltm::{LtmPage, LtmRepo};
use crate::messages::{IdRange, MessageRepo, NewMessage, SaveOutcome, StoredMessage};

#[derive(Clone, Debug)]
enum Location {
    File(PathBuf),
    Memory { fts: bool },
}

/// Async handle to the message store.
///
/// The database is opened on first use. Every operation goes through
/// [`ensure_ready`](Self::ensure_ready), which opens it at most once even
/// under concurrent first use; a failed open is retried by the next call.
/// SQLite work runs on the blocking pool.
pub struct MessageStore {
    location: Location,
    db: OnceCell<Database>,
}

impl MessageStore {
    /// Store backed by a file, opened lazily.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            db: OnceCell::new(),
        }
    }

    /// Private in-memory store, opened lazily.
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory { fts: true },
            db: OnceCell::new(),
        }
    }

    /// In-memory store without the full-text index.
    pub fn in_memory_without_fts() -> Self {
        Self {
            location: Location::Memory { fts: false },
            db: OnceCell::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.db.initialized()
    }

    /// Open the database if this has not happened yet.
    pub async fn ensure_ready(&self) -> Result<&Database, StoreError> {
        self.db
            .get_or_try_init(|| async {
                let location = self.location.clone();
                let db = tokio::task::spawn_blocking(move || match location {
                    Location::File(path) => Database::open(&path),
                    Location::Memory { fts: true } => Database::in_memory(),
                    Location::Memory { fts: false } => Database::in_memory_without_fts(),
                })
                .await
                .map_err(|e| StoreError::Unavailable(format!("open task failed: {e}")))?;
                match &db {
                    Ok(db) => info!(path = %db.path().display(), "message store ready"),
                    Err(e) => {
                        warn!(location = ?self.location, error = %e, "message store failed to open")
                    }
                }
                db
            })
            .await
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.ensure_ready().await?.clone();
        let result = tokio::task::spawn_blocking(move || f(db))
            .await
            .map_err(|e| StoreError::Unavailable(format!("{op} task failed: {e}")))?;
        if let Err(e) = &result {
            warn!(op, error = %e, "store operation failed");
        }
        result
    }

    #[instrument(skip(self, msg), fields(role = %msg.role, tokens = ?msg.token_count))]
    pub async fn save_message(&self, msg: NewMessage) -> Result<SaveOutcome, StoreError> {
        let outcome = self
            .run("save_message", move |db| MessageRepo::new(db).insert(&msg))
            .await?;
        match outcome {
            SaveOutcome::Saved { id } => debug!(id, "message saved"),
            SaveOutcome::Skipped => debug!("summarization message not saved"),
        }
        Ok(outcome)
    }

    pub async fn get_messages(
        &self,
        limit: u32,
        offset: u32,
        session_id: Option<String>,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.run("get_messages", move |db| {
            MessageRepo::new(db).list(limit, offset, session_id.as_deref())
        })
        .await
    }

    pub async fn search_messages(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.run("search_messages", move |db| {
            MessageRepo::new(db).search_substring(&query, limit)
        })
        .await
    }

    pub async fn search_relevant(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<RankedMessage>, StoreError> {
        self.run("search_relevant", move |db| {
            MessageRepo::new(db).search_relevant(&query, limit)
        })
        .await
    }

    pub async fn rebuild_index(&self) -> Result<usize, StoreError> {
        let indexed = self
            .run("rebuild_index", |db| MessageRepo::new(db).rebuild_index())
            .await?;
        info!(indexed, "full-text index rebuilt");
        Ok(indexed)
    }

    pub async fn clear_messages(&self) -> Result<usize, StoreError> {
        let deleted = self
            .run("clear_messages", |db| MessageRepo::new(db).clear())
            .await?;
        info!(deleted, "messages cleared");
        Ok(deleted)
    }

    pub async fn message_count(&self, session_id: Option<String>) -> Result<u64, StoreError> {
        self.run("message_count", move |db| {
            MessageRepo::new(db).count(session_id.as_deref())
        })
        .await
    }

    pub async fn recent_messages(
        &self,
        count: u32,
        session_id: Option<String>,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.run("recent_messages", move |db| {
            MessageRepo::new(db).recent(count, session_id.as_deref())
        })
        .await
    }

    pub async fn messages_by_id_range(
        &self,
        min_id: i64,
        max_id: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.run("messages_by_id_range", move |db| {
            MessageRepo::new(db).by_id_range(min_id, max_id)
        })
        .await
    }

    pub async fn id_range(&self) -> Result<IdRange, StoreError> {
        self.run("id_range", |db| MessageRepo::new(db).id_range()).await
    }

    pub async fn ltm_message_count(&self) -> Result<u64, StoreError> {
        self.run("ltm_message_count", |db| MessageRepo::new(db).ltm_count())
            .await
    }

    pub async fn ltm_total_tokens(&self) -> Result<i64, StoreError> {
        self.run("ltm_total_tokens", |db| MessageRepo::new(db).ltm_total_tokens())
            .await
    }

    pub async fn ltm_page(
        &self,
        max_tokens: u64,
        offset_tokens: u64,
    ) -> Result<LtmPage, StoreError> {
        self.run("ltm_page", move |db| {
            LtmRepo::new(db).page_by_tokens(max_tokens, offset_tokens)
        })
        .await
    }

    pub async fn ltm_search_page(
        &self,
        query: String,
        max_tokens: u64,
        offset_tokens: u64,
    ) -> Result<LtmPage, StoreError> {
        self.run("ltm_search_page", move |db| {
            LtmRepo::new(db).search_page_by_tokens(&query, max_tokens, offset_tokens)
        })
        .await
    }
}
