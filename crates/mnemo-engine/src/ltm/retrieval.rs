use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use mnemo_core::provider::ChatProvider;
use mnemo_llm::models::context_limit;
use mnemo_store::{LtmMessage, LtmPage};

use super::relevance::classify;
use super::{LtmPager, PageScope};

/// Hard cap on judged pages per retrieval.
pub const MAX_BATCHES: u32 = 10;
/// Retrieval stops once this many relevant messages are collected.
pub const SUFFICIENT_RELEVANT: usize = 10;

/// Token budget of one page: one and a half context windows of `model`.
pub fn page_budget(model: &str) -> u64 {
    u64::from(context_limit(Some(model))) * 3 / 2
}

/// Parameters of one retrieval run.
#[derive(Clone, Debug)]
pub struct RetrievalRequest<'a> {
    /// Question the judge weighs each message against.
    pub user_query: &'a str,
    /// Model used for the judge and for sizing pages.
    pub model: &'a str,
    pub scope: PageScope,
    pub offset_tokens: u64,
}

impl<'a> RetrievalRequest<'a> {
    pub fn new(user_query: &'a str, model: &'a str) -> Self {
        Self {
            user_query,
            model,
            scope: PageScope::All,
            offset_tokens: 0,
        }
    }

    pub fn with_scope(mut self, scope: PageScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn starting_at(mut self, offset_tokens: u64) -> Self {
        self.offset_tokens = offset_tokens;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalOutcome {
    pub relevant_messages: Vec<LtmMessage>,
    /// Cumulative position reached; resume from here to continue.
    pub total_tokens: u64,
    pub has_more: bool,
    /// Whether any non-empty page was fetched.
    pub found: bool,
    pub batches: u32,
}

/// Walk long-term memory page by page, keeping what the judge deems
/// relevant to the request's query.
///
/// Pages are fetched and judged strictly one after another. A store failure
/// ends the walk as if memory were exhausted.
#[instrument(
    skip_all,
    fields(model = request.model, offset_tokens = request.offset_tokens)
)]
pub async fn retrieve(
    pager: &dyn LtmPager,
    judge: &dyn ChatProvider,
    request: RetrievalRequest<'_>,
) -> RetrievalOutcome {
    let budget = page_budget(request.model);
    let mut outcome = RetrievalOutcome {
        total_tokens: request.offset_tokens,
        ..RetrievalOutcome::default()
    };

    while outcome.batches < MAX_BATCHES {
        let offset_tokens = outcome.total_tokens;
        let page = match pager.page(&request.scope, budget, offset_tokens).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, offset_tokens, "ltm page failed, stopping retrieval");
                LtmPage::default()
            }
        };

        if page.is_empty() {
            debug!(offset_tokens, batch = outcome.batches, "ltm exhausted");
            outcome.has_more = false;
            break;
        }
        outcome.found = true;

        let relevant = classify(&page.messages, request.user_query, judge, request.model).await;
        debug!(
            batch = outcome.batches,
            offset_tokens,
            page = page.messages.len(),
            relevant = relevant.len(),
            "ltm batch judged"
        );
        outcome.relevant_messages.extend(relevant);
        outcome.total_tokens = page.total_tokens;
        outcome.has_more = page.has_more;
        outcome.batches += 1;

        if outcome.relevant_messages.len() >= SUFFICIENT_RELEVANT || !page.has_more {
            break;
        }
    }

    info!(
        found = outcome.found,
        relevant = outcome.relevant_messages.len(),
        batches = outcome.batches,
        total_tokens = outcome.total_tokens,
        has_more = outcome.has_more,
        "ltm retrieval done"
    );
    outcome
}
