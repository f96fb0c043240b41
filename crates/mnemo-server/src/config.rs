use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::warn;

use mnemo_llm::hub::HUB_MODELS_URL;
use mnemo_llm::models::ProviderKind;
use mnemo_llm::openai::OpenAiCompatProvider;
use mnemo_llm::registry::ProviderRegistry;

/// Largest accepted request body.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub body_limit: usize,
    pub hub_models_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            database_path: PathBuf::from("chat_memory.db"),
            body_limit: DEFAULT_BODY_LIMIT,
            hub_models_url: HUB_MODELS_URL.into(),
        }
    }
}

/// Provider credentials and model choices, normally read from the environment.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub deepseek_api_key: Option<SecretString>,
    pub deepseek_model: String,
    pub huggingface_api_key: Option<SecretString>,
    pub huggingface_model: String,
    pub default_provider: ProviderKind,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ProviderSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Empty values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let model = |kind: ProviderKind| {
            var(kind.model_var()).unwrap_or_else(|| kind.default_model().to_string())
        };
        let key = |kind: ProviderKind| var(kind.api_key_var()).map(SecretString::from);

        let default_provider = match var("DEFAULT_PROVIDER") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "unsupported DEFAULT_PROVIDER, using deepseek");
                ProviderKind::DeepSeek
            }),
            None => ProviderKind::DeepSeek,
        };

        Self {
            deepseek_api_key: key(ProviderKind::DeepSeek),
            deepseek_model: model(ProviderKind::DeepSeek),
            huggingface_api_key: key(ProviderKind::HuggingFace),
            huggingface_model: model(ProviderKind::HuggingFace),
            default_provider,
        }
    }

    pub fn api_key(&self, kind: ProviderKind) -> Option<&SecretString> {
        match kind {
            ProviderKind::DeepSeek => self.deepseek_api_key.as_ref(),
            ProviderKind::HuggingFace => self.huggingface_api_key.as_ref(),
        }
    }

    pub fn model(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::DeepSeek => &self.deepseek_model,
            ProviderKind::HuggingFace => &self.huggingface_model,
        }
    }

    /// Registry holding one HTTP provider per supported kind. Providers
    /// without a key are still registered and fail per call.
    pub fn registry(&self) -> ProviderRegistry {
        ProviderKind::ALL.into_iter().fold(
            ProviderRegistry::new(self.default_provider.id()),
            |registry, kind| {
                registry.with(Arc::new(OpenAiCompatProvider::new(
                    kind,
                    self.api_key(kind).cloned(),
                    Some(self.model(kind).to_string()),
                )))
            },
        )
    }
}
