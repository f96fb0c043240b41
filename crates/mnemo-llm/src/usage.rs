use serde::Serialize;

use mnemo_core::messages::ChatMessage;
use mnemo_core::provider::ChatCompletion;
use mnemo_core::tokens::estimate_tokens;

use crate::models::context_limit;

/// Token accounting attached to every chat reply.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TokenUsageReport {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// True when the provider sent no `usage` block and counts were estimated.
    pub estimated: bool,
    pub max_context_tokens: u32,
    /// Share of the context window used, capped at 100, one decimal place.
    pub context_usage_percent: f64,
}

/// Usage for a completed exchange: provider-reported when available,
/// otherwise estimated from the prompt messages and the reply text.
pub fn extract_token_usage(
    completion: &ChatCompletion,
    messages: &[ChatMessage],
    reply: &str,
    model: &str,
) -> TokenUsageReport {
    let max_context_tokens = context_limit(Some(model));

    let (prompt_tokens, completion_tokens, total_tokens, estimated) = match &completion.usage {
        Some(usage) => (usage.prompt_tokens, usage.completion_tokens, usage.total_tokens, false),
        None => {
            let prompt_text = messages
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = estimate_tokens(&prompt_text, model);
            let reply_tokens = estimate_tokens(reply, model);
            (prompt, reply_tokens, prompt.saturating_add(reply_tokens), true)
        }
    };

    TokenUsageReport {
        prompt_tokens,
        completion_tokens,
        total_tokens,
        estimated,
        max_context_tokens,
        context_usage_percent: usage_percent(total_tokens, max_context_tokens),
    }
}

fn usage_percent(total: u32, max: u32) -> f64 {
    if max == 0 {
        return 100.0;
    }
    let percent = (f64::from(total) / f64::from(max) * 100.0).min(100.0);
    (percent * 10.0).round() / 10.0
}
