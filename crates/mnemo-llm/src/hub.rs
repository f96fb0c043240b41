//! Hugging Face Hub model discovery for the model picker.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use mnemo_core::GatewayError;

use crate::models::{HUGGINGFACE_MODELS, VERIFIED_HUGGINGFACE_MODELS};

pub const HUB_MODELS_URL: &str = "https://huggingface.co/api/models?filter=text-generation-inference&sort=downloads&direction=-1&limit=50";

const MAX_LISTED_MODELS: usize = 30;
const HUB_TIMEOUT: Duration = Duration::from_secs(10);

const EXCLUDE_PATTERNS: &[&str] = &[
    "gpt2",
    "gpt-2",
    "base",
    "vision",
    "embedding",
    "tokenizer",
    "openai-community/gpt2",
    "qwen3-",
    "qwen2-0",
    "-0.6b",
    "-1.5b",
    "-3b-instruct",
];

const INCLUDE_PATTERNS: &[&str] = &[
    "qwen2.5-",
    "llama-3.1-",
    "llama-3.2-",
    "llama-2-7b-chat",
    "mistral-7b-instruct",
    "mixtral-8x7b-instruct",
    "gemma-2-",
    "deepseek-",
    "glm-",
];

// Dropped again after discovery; known to fail on the router.
const PROBLEMATIC_PATTERNS: &[&str] = &["qwen3-", "qwen2-0", "-0.6b", "-1.5b", "qwen2.5-1.5b"];

#[derive(Debug, Deserialize)]
struct HubModel {
    #[serde(default)]
    id: Option<String>,
}

/// Whether a Hub model id looks like a chat model the router can serve.
pub fn is_chat_model(id: &str) -> bool {
    if !id.contains('/') {
        return false;
    }
    let lower = id.to_lowercase();

    if lower.contains("qwen") && !lower.contains("-instruct") {
        return false;
    }
    if lower.contains("llama") && !lower.contains("-instruct") && !lower.contains("-chat") {
        return false;
    }
    if lower.contains("mistral") && !lower.contains("-instruct") {
        return false;
    }
    if lower.contains("gemma") && !lower.contains("-it") {
        return false;
    }

    let excluded = EXCLUDE_PATTERNS.iter().any(|p| lower.contains(p));
    let included = INCLUDE_PATTERNS.iter().any(|p| lower.contains(p));
    !excluded && included
}

/// Build the advertised Hugging Face model list from discovered Hub ids.
///
/// Verified models come first, duplicates are removed, and the list is capped.
/// An empty discovery result yields the curated catalog.
pub fn merge_discovered(discovered: impl IntoIterator<Item = String>) -> Vec<String> {
    let chat: Vec<String> = discovered
        .into_iter()
        .filter(|id| is_chat_model(id))
        .take(MAX_LISTED_MODELS)
        .collect();

    if chat.is_empty() {
        return HUGGINGFACE_MODELS.iter().map(|m| (*m).to_string()).collect();
    }

    let mut merged: Vec<String> = Vec::with_capacity(MAX_LISTED_MODELS);
    let candidates = VERIFIED_HUGGINGFACE_MODELS
        .iter()
        .map(|m| (*m).to_string())
        .chain(chat.into_iter().filter(|id| {
            let lower = id.to_lowercase();
            !PROBLEMATIC_PATTERNS.iter().any(|p| lower.contains(p))
        }));
    for id in candidates {
        if !merged.contains(&id) {
            merged.push(id);
        }
    }
    merged.truncate(MAX_LISTED_MODELS);
    merged
}

/// Query the Hub for text-generation models.
pub async fn fetch_hub_models(
    client: &Client,
    url: &str,
    api_key: &SecretString,
) -> Result<Vec<String>, GatewayError> {
    let resp = client
        .get(url)
        .bearer_auth(api_key.expose_secret())
        .timeout(HUB_TIMEOUT)
        .send()
        .await
        .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(GatewayError::from_status(status, body));
    }

    let models: Vec<HubModel> = resp
        .json()
        .await
        .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
    Ok(models.into_iter().filter_map(|m| m.id).collect())
}

/// Hugging Face models to advertise. Without a key, or when the Hub is
/// unreachable, the curated catalog is returned.
pub async fn huggingface_models(
    client: &Client,
    url: &str,
    api_key: Option<&SecretString>,
) -> Vec<String> {
    let discovered = match api_key {
        Some(key) => match fetch_hub_models(client, url, key).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "hub model listing failed");
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    let models = merge_discovered(discovered);
    debug!(count = models.len(), "huggingface models resolved");
    models
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn chat_model_filter() {
        assert!(is_chat_model("Qwen/Qwen2.5-72B-Instruct"));
        assert!(is_chat_model("meta-llama/Llama-3.1-8B-Instruct"));
        assert!(is_chat_model("google/gemma-2-9b-it"));
        assert!(is_chat_model("deepseek-ai/DeepSeek-R1"));

        assert!(!is_chat_model("gpt2"));
        assert!(!is_chat_model("Qwen/Qwen2.5-7B"));
        assert!(!is_chat_model("meta-llama/Llama-3.1-8B"));
        assert!(!is_chat_model("Qwen/Qwen3-8B-Instruct"));
        assert!(!is_chat_model("meta-llama/Llama-3.2-3B-Instruct"));
        assert!(!is_chat_model("bigscience/bloom"));
    }

    #[test]
    fn empty_discovery_falls_back_to_catalog() {
        let models = merge_discovered(vec!["gpt2".to_string()]);
        assert_eq!(models.len(), HUGGINGFACE_MODELS.len());
        assert_eq!(models[0], "Qwen/Qwen2.5-72B-Instruct");
    }

    #[test]
    fn verified_models_lead_without_duplicates() {
        let models = merge_discovered(vec![
            "Qwen/Qwen2.5-7B-Instruct".to_string(),
            "Qwen/Qwen2.5-32B-Instruct".to_string(),
        ]);
        assert_eq!(models[0], "Qwen/Qwen2.5-7B-Instruct");
        assert_eq!(models.len(), VERIFIED_HUGGINGFACE_MODELS.len() + 1);
        assert_eq!(models.last().unwrap(), "Qwen/Qwen2.5-32B-Instruct");
    }

    #[test]
    fn merged_list_is_capped() {
        let discovered = (0..80).map(|i| format!("deepseek-ai/deepseek-{i}"));
        assert_eq!(merge_discovered(discovered).len(), 30);
    }

    #[tokio::test]
    async fn fetches_hub_listing_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/models"))
            .and(header("authorization", "Bearer hf_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "Qwen/Qwen2.5-32B-Instruct"},
                {"id": "openai-community/gpt2"},
                {"modelId": "no-id"}
            ])))
            .mount(&server)
            .await;

        let key = SecretString::from("hf_test");
        let url = format!("{}/api/models", server.uri());
        let models = huggingface_models(&Client::new(), &url, Some(&key)).await;
        assert!(models.contains(&"Qwen/Qwen2.5-32B-Instruct".to_string()));
        assert!(!models.iter().any(|m| m.contains("gpt2")));
    }

    #[tokio::test]
    async fn hub_error_falls_back_to_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let key = SecretString::from("hf_test");
        let url = format!("{}/api/models", server.uri());
        let models = huggingface_models(&Client::new(), &url, Some(&key)).await;
        assert_eq!(models.len(), HUGGINGFACE_MODELS.len());
    }

    #[tokio::test]
    async fn no_key_skips_hub() {
        let models = huggingface_models(&Client::new(), "http://127.0.0.1:9/unused", None).await;
        assert_eq!(models.len(), HUGGINGFACE_MODELS.len());
    }
}
