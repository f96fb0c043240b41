use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tiktoken_rs::tokenizer::{get_tokenizer, Tokenizer};
use tiktoken_rs::CoreBPE;

/// Token usage block as returned by OpenAI-compatible providers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

const CJK_TOKENS_PER_CHAR: f64 = 0.6;
const CYRILLIC_TOKENS_PER_CHAR: f64 = 0.4;
const DEFAULT_TOKENS_PER_CHAR: f64 = 0.3;

static BPE_CACHE: LazyLock<Mutex<HashMap<Tokenizer, Arc<CoreBPE>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Estimate the token count of `text` for `model`.
///
/// Models known to tiktoken are tokenized exactly. Everything else goes
/// through a per-script character heuristic. Never fails.
pub fn estimate_tokens(text: &str, model: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    match exact_count(text, model) {
        Some(count) => count,
        None => heuristic_tokens(text),
    }
}

fn exact_count(text: &str, model: &str) -> Option<u32> {
    let tokenizer = get_tokenizer(model)?;
    let bpe = bpe_for(tokenizer)?;
    let count = bpe.encode_with_special_tokens(text).len();
    Some(u32::try_from(count).unwrap_or(u32::MAX))
}

fn bpe_for(tokenizer: Tokenizer) -> Option<Arc<CoreBPE>> {
    let mut cache = BPE_CACHE.lock();
    if let Some(bpe) = cache.get(&tokenizer) {
        return Some(Arc::clone(bpe));
    }
    match tiktoken_rs::get_bpe_from_tokenizer(tokenizer) {
        Ok(bpe) => {
            let bpe = Arc::new(bpe);
            let _ = cache.insert(tokenizer, Arc::clone(&bpe));
            Some(bpe)
        }
        Err(e) => {
            tracing::debug!(?tokenizer, error = %e, "tokenizer unavailable, using heuristic");
            None
        }
    }
}

/// Character-count heuristic: `ceil(chars * multiplier)`, where the
/// multiplier depends on the first script found (CJK, then Cyrillic).
pub fn heuristic_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }
    let multiplier = if text.chars().any(is_cjk) {
        CJK_TOKENS_PER_CHAR
    } else if text.chars().any(is_cyrillic) {
        CYRILLIC_TOKENS_PER_CHAR
    } else {
        DEFAULT_TOKENS_PER_CHAR
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let estimate = (chars as f64 * multiplier).ceil() as u32;
    estimate
}

fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}
