//! Detection of summarization exchanges, which never enter long-term memory.

use mnemo_core::messages::ChatMessage;

const USER_MARKERS: &[&str] = &["суммар", "кратк", "краткое резюме", "summarize", "summary"];

const REPLY_MARKERS: &[&str] = &[
    "краткая суммаризация",
    "суммаризация контекста",
    "краткое резюме",
    "summary of",
    "context summary",
];

/// True when the user message is flagged as a summarization request, its
/// text asks for a summary, or the reply reads like one.
pub fn is_summarization_exchange(user: Option<&ChatMessage>, reply: Option<&str>) -> bool {
    if let Some(user) = user {
        if user.is_summarization || contains_any(&user.content, USER_MARKERS) {
            return true;
        }
    }
    reply.is_some_and(|text| contains_any(text, REPLY_MARKERS))
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    let lower = text.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}
