use mnemo_core::messages::ChatMessage;

/// Instructions prepended when long-term memory is enabled.
pub const MEMORY_SYSTEM_PROMPT: &str = "You have access to long-term memory (LTM) holding the history of earlier messages.\n\n\
If you need information from long-term memory, use the command:\n\
**ltm_search**(your query)\n\n\
For example:\n\
- **ltm_search**(Python project)\n\
- **ltm_search**(architecture discussion)\n\
- **ltm_search**(Moscow)\n\
- **ltm_search**(the city I wanted to talk about)\n\n\
IMPORTANT: the command must look exactly like **ltm_search**(query text), where the query text is your question or keywords to look up in memory.\n\n\
The system loads relevant messages from memory through semantic search. If the first batch does not hold the information, further batches may be loaded.\n\n\
IMPORTANT: summarization messages are not stored in LTM; rely on regular messages only.";

/// Combined system prompt for a turn, `None` when there is nothing to say.
///
/// Memory instructions come first, the caller's prompt second, separated by
/// a blank line. A blank caller prompt is ignored.
pub fn assemble_system_prompt(use_memory: bool, custom: Option<&str>) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    if use_memory {
        parts.push(MEMORY_SYSTEM_PROMPT);
    }
    if let Some(custom) = custom.filter(|c| !c.trim().is_empty()) {
        parts.push(custom);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// `messages` preceded by a system message carrying `system`, if any.
pub fn with_system_prompt(system: Option<&str>, messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        out.push(ChatMessage::system(system));
    }
    out.extend_from_slice(messages);
    out
}
