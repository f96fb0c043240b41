use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Context size assumed for unknown or unspecified models.
pub const DEFAULT_CONTEXT_LIMIT: u32 = 64_000;

/// Known model context windows, in tokens.
///
/// Order matters: the fuzzy lookup in [`context_limit`] returns the first
/// entry whose name contains (or is contained in) the requested model.
pub static MODEL_CONTEXT_LIMITS: &[(&str, u32)] = &[
    ("deepseek-chat", 64_000),
    ("deepseek-reasoner", 64_000),
    ("deepseek-chat-reasoner", 64_000),
    ("deepseek-ai/DeepSeek-V3-0324", 128_000),
    ("deepseek-ai/DeepSeek-V2-Lite", 64_000),
    ("deepseek-ai/DeepSeek-R1", 64_000),
    ("Qwen/Qwen2.5-72B-Instruct", 128_000),
    ("Qwen/Qwen2.5-32B-Instruct", 128_000),
    ("Qwen/Qwen2.5-14B-Instruct", 128_000),
    ("Qwen/Qwen2.5-7B-Instruct", 128_000),
    ("Qwen/Qwen2.5-3B-Instruct", 128_000),
    ("meta-llama/Llama-3.1-8B-Instruct", 128_000),
    ("meta-llama/Llama-3.1-70B-Instruct", 128_000),
    ("meta-llama/Llama-3.2-3B-Instruct", 128_000),
    ("meta-llama/Llama-2-7b-chat-hf", 4_096),
    ("google/gemma-2-2b-it", 8_192),
    ("google/gemma-2-9b-it", 8_192),
    ("mistralai/Mistral-7B-Instruct-v0.2", 32_768),
    ("mistralai/Mixtral-8x7B-Instruct-v0.1", 32_768),
    ("zai-org/GLM-4.7-Flash:novita", 128_000),
];

// Checked in order when neither exact nor fuzzy lookup matched.
static FAMILY_LIMITS: &[(&[&str], u32)] = &[
    (&["deepseek"], 64_000),
    (&["qwen", "Qwen"], 128_000),
    (&["llama", "Llama"], 128_000),
    (&["gemma", "Gemma"], 8_192),
    (&["mistral", "Mistral"], 32_768),
];

/// Maximum context size for `model`.
///
/// Exact table match, then substring match in either direction over the table
/// in declaration order, then a provider-family guess, then
/// [`DEFAULT_CONTEXT_LIMIT`].
pub fn context_limit(model: Option<&str>) -> u32 {
    let model = match model {
        Some(m) if !m.is_empty() => m,
        _ => return DEFAULT_CONTEXT_LIMIT,
    };

    if let Some((_, limit)) = MODEL_CONTEXT_LIMITS.iter().find(|(name, _)| *name == model) {
        return *limit;
    }

    if let Some((_, limit)) = MODEL_CONTEXT_LIMITS
        .iter()
        .find(|(name, _)| model.contains(name) || name.contains(model))
    {
        return *limit;
    }

    FAMILY_LIMITS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| model.contains(n)))
        .map_or(DEFAULT_CONTEXT_LIMIT, |(_, limit)| *limit)
}

/// Hosted provider families reachable through an OpenAI-compatible API.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DeepSeek,
    HuggingFace,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::DeepSeek, ProviderKind::HuggingFace];

    /// Identifier used in requests and config (`deepseek`, `huggingface`).
    pub fn id(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek",
            Self::HuggingFace => "huggingface",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::DeepSeek => "DeepSeek",
            Self::HuggingFace => "Hugging Face",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::HuggingFace => "https://router.huggingface.co/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek-chat",
            Self::HuggingFace => "Qwen/Qwen2.5-7B-Instruct",
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::HuggingFace => "HUGGINGFACE_API_KEY",
        }
    }

    /// Environment variable overriding the default model.
    pub fn model_var(&self) -> &'static str {
        match self {
            Self::DeepSeek => "DEEPSEEK_MODEL",
            Self::HuggingFace => "HUGGINGFACE_MODEL",
        }
    }

    pub fn presets(&self) -> ModelPresets {
        match self {
            Self::DeepSeek => ModelPresets {
                top: "deepseek-ai/DeepSeek-V3-0324",
                medium: "deepseek-chat",
                light: "deepseek-chat",
            },
            Self::HuggingFace => ModelPresets {
                top: "Qwen/Qwen2.5-72B-Instruct",
                medium: "Qwen/Qwen2.5-7B-Instruct",
                light: "google/gemma-2-2b-it",
            },
        }
    }

    /// Static model catalog advertised to clients.
    pub fn catalog(&self) -> &'static [&'static str] {
        match self {
            Self::DeepSeek => DEEPSEEK_MODELS,
            Self::HuggingFace => HUGGINGFACE_MODELS,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProviderKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deepseek" => Ok(Self::DeepSeek),
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Quick-pick models per quality tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ModelPresets {
    pub top: &'static str,
    pub medium: &'static str,
    pub light: &'static str,
}

pub static DEEPSEEK_MODELS: &[&str] = &[
    "deepseek-ai/DeepSeek-V3-0324",
    "deepseek-chat",
    "deepseek-reasoner",
    "deepseek-chat-reasoner",
    "deepseek-ai/DeepSeek-V2-Lite",
    "deepseek-ai/DeepSeek-R1",
];

/// Models known to work through the Hugging Face router chat endpoint.
pub static HUGGINGFACE_MODELS: &[&str] = &[
    "Qwen/Qwen2.5-72B-Instruct",
    "Qwen/Qwen2.5-32B-Instruct",
    "Qwen/Qwen2.5-14B-Instruct",
    "Qwen/Qwen2.5-7B-Instruct",
    "Qwen/Qwen2.5-3B-Instruct",
    "meta-llama/Llama-3.1-8B-Instruct",
    "meta-llama/Llama-3.1-70B-Instruct",
    "meta-llama/Llama-3.2-3B-Instruct",
    "meta-llama/Llama-2-7b-chat-hf",
    "google/gemma-2-2b-it",
    "google/gemma-2-9b-it",
    "mistralai/Mistral-7B-Instruct-v0.2",
    "mistralai/Mixtral-8x7B-Instruct-v0.1",
    "deepseek-ai/DeepSeek-V3-0324",
    "deepseek-ai/DeepSeek-V2-Lite",
    "deepseek-ai/DeepSeek-R1",
    "zai-org/GLM-4.7-Flash:novita",
];

/// Placed ahead of models discovered on the Hub.
pub static VERIFIED_HUGGINGFACE_MODELS: &[&str] = &[
    "Qwen/Qwen2.5-7B-Instruct",
    "Qwen/Qwen2.5-14B-Instruct",
    "meta-llama/Llama-3.1-8B-Instruct",
    "google/gemma-2-2b-it",
    "mistralai/Mistral-7B-Instruct-v0.2",
    "zai-org/GLM-4.7-Flash:novita",
];
