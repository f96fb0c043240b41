use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use mnemo_core::messages::ChatMessage;
use mnemo_core::provider::ChatProvider;

use super::Candidate;

/// Sampling temperature for judge calls.
pub const JUDGE_TEMPERATURE: f64 = 0.3;

const PREVIEW_CHARS: usize = 500;

const JUDGE_SYSTEM_PROMPT: &str = "You help find relevant messages in a conversation history. \
Reply only with a list of message numbers such as [0, 1, 2], or [] if nothing is relevant.";

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([\d\s,]*)\]").expect("bracketed list pattern is valid"));
static BARE_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\b").expect("bare integer pattern is valid"));

/// Keep the candidates the judge considers relevant to `user_query`.
///
/// Issues one judge call. The result preserves the candidates' relative
/// order. A failed judge call keeps every candidate.
pub async fn classify<T: Candidate>(
    candidates: &[T],
    user_query: &str,
    judge: &dyn ChatProvider,
    model: &str,
) -> Vec<T> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let messages = vec![
        ChatMessage::system(JUDGE_SYSTEM_PROMPT),
        ChatMessage::user(judge_prompt(candidates, user_query)),
    ];

    match judge.complete(&messages, Some(JUDGE_TEMPERATURE), model).await {
        Ok(completion) => {
            let indices = parse_indices(completion.text(), candidates.len());
            debug!(
                candidates = candidates.len(),
                relevant = indices.len(),
                ?indices,
                "relevance judged"
            );
            indices.into_iter().map(|i| candidates[i].clone()).collect()
        }
        Err(e) => {
            warn!(
                error = %e,
                kind = e.error_kind(),
                candidates = candidates.len(),
                "relevance judge failed, keeping whole batch"
            );
            candidates.to_vec()
        }
    }
}

fn judge_prompt<T: Candidate>(candidates: &[T], user_query: &str) -> String {
    let listing = candidates
        .iter()
        .enumerate()
        .map(|(idx, c)| format!("[{idx}] {}: {}", c.role(), preview(c.content())))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    let last = candidates.len() - 1;

    format!(
        "Find the messages from the conversation history that help answer the user's question.\n\n\
         USER QUESTION: \"{user_query}\"\n\n\
         HISTORY MESSAGES (numbered 0 to {last}):\n\n\
         {listing}\n\n\
         TASK: decide which messages contain information relevant to answering \"{user_query}\". \
         A message is relevant if it answers the question directly, gives context needed to \
         understand it, or holds related details for a complete answer.\n\n\
         RESPONSE FORMAT: return ONLY the numbers of relevant messages, like [0, 3, 5, 7]. \
         If none are relevant, return [].\n\n\
         Do not add any explanation."
    )
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Indices in `0..len` named by a judge reply, ascending and unique.
///
/// The first bracketed group is read as a comma-separated list. When it
/// yields nothing usable, every bare integer in the reply is considered.
pub fn parse_indices(reply: &str, len: usize) -> Vec<usize> {
    let in_range = |n: &usize| *n < len;

    let mut indices: BTreeSet<usize> = BRACKETED
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|list| {
            list.as_str()
                .split(',')
                .filter_map(leading_integer)
                .filter(in_range)
                .collect()
        })
        .unwrap_or_default();

    if indices.is_empty() {
        indices = BARE_INTEGER
            .captures_iter(reply)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
            .filter(in_range)
            .collect();
    }

    indices.into_iter().collect()
}

/// The run of digits a list item starts with, so `"1 2"` reads as 1.
fn leading_integer(part: &str) -> Option<usize> {
    part.trim()
        .split(|c: char| !c.is_ascii_digit())
        .next()?
        .parse()
        .ok()
}
