use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use mnemo_core::provider::ChatProvider;

/// Named chat providers plus the one used when a request names none.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ChatProvider>>,
    default_provider: String,
}

impl ProviderRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register under the provider's own name.
    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        let _ = self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ChatProvider>> {
        self.providers.get(name).cloned()
    }

    /// Provider for a request: the named one if registered, otherwise the default.
    pub fn resolve(&self, requested: Option<&str>) -> Option<Arc<dyn ChatProvider>> {
        if let Some(name) = requested.filter(|n| !n.is_empty()) {
            if let Some(p) = self.get(name) {
                return Some(p);
            }
            debug!(
                requested = name,
                fallback = %self.default_provider,
                "unknown provider, using default"
            );
        }
        self.get(&self.default_provider)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
