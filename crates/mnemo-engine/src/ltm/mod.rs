//! Long-term memory retrieval: token-budgeted pages from the store, judged
//! for relevance one page at a time.

pub mod relevance;
pub mod retrieval;

use async_trait::async_trait;

use mnemo_core::messages::{ChatMessage, Role};
use mnemo_store::{LtmMessage, LtmPage, MessageStore, StoreError, StoredMessage};

/// Which qualifying rows a page is drawn from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PageScope {
    #[default]
    All,
    /// Only rows containing every whitespace-separated word (case-sensitive).
    Matching(String),
}

/// Source of long-term memory pages.
#[async_trait]
pub trait LtmPager: Send + Sync {
    async fn page(
        &self,
        scope: &PageScope,
        max_tokens: u64,
        offset_tokens: u64,
    ) -> Result<LtmPage, StoreError>;
}

#[async_trait]
impl LtmPager for MessageStore {
    async fn page(
        &self,
        scope: &PageScope,
        max_tokens: u64,
        offset_tokens: u64,
    ) -> Result<LtmPage, StoreError> {
        match scope {
            PageScope::All => self.ltm_page(max_tokens, offset_tokens).await,
            PageScope::Matching(query) => {
                self.ltm_search_page(query.clone(), max_tokens, offset_tokens)
                    .await
            }
        }
    }
}

/// Anything the relevance judge can be shown.
pub trait Candidate: Clone {
    fn role(&self) -> Role;
    fn content(&self) -> &str;
}

impl Candidate for ChatMessage {
    fn role(&self) -> Role {
        self.role
    }
    fn content(&self) -> &str {
        &self.content
    }
}

impl Candidate for StoredMessage {
    fn role(&self) -> Role {
        self.role
    }
    fn content(&self) -> &str {
        &self.content
    }
}

impl Candidate for LtmMessage {
    fn role(&self) -> Role {
        self.message.role
    }
    fn content(&self) -> &str {
        &self.message.content
    }
}
