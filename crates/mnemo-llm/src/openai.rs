use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use mnemo_core::errors::GatewayError;
use mnemo_core::messages::ChatMessage;
use mnemo_core::provider::{ChatCompletion, ChatProvider};

use crate::models::ProviderKind;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiCompatProvider {
    client: Client,
    kind: ProviderKind,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(kind: ProviderKind, api_key: Option<SecretString>, model: Option<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "falling back to default HTTP client");
                Client::new()
            });
        Self {
            client,
            kind,
            base_url: kind.base_url().to_string(),
            api_key: api_key.filter(|k| !k.expose_secret().is_empty()),
            model: model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| kind.default_model().to_string()),
        }
    }

    /// Point the client at a different base URL (tests, self-hosted gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn classify_failure(&self, status: u16, body: String, model: &str) -> GatewayError {
        let detail = extract_error_message(&body).unwrap_or_else(|| body.clone());
        let model_problem = status == 404
            || (status == 400
                && ["not found", "Model", "not a chat model", "model_not_supported"]
                    .iter()
                    .any(|needle| body.contains(needle)));
        if model_problem {
            return GatewayError::ModelUnavailable {
                model: model.to_string(),
                detail: format!("{} API error: {status} - {detail}", self.kind.display_name()),
            };
        }
        GatewayError::from_status(
            status,
            format!("{} API error: {status} - {detail}", self.kind.display_name()),
        )
    }
}

/// Pull a human-readable message out of a provider error body.
///
/// Handles `{"error": "..."}`, `{"error": {"message": ...}}`,
/// `{"error": {"type": ..., "code": ...}}` and `{"message": ...}`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("error") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Object(obj)) => {
            if let Some(msg) = obj.get("message").and_then(|m| m.as_str()) {
                Some(msg.to_string())
            } else if let Some(kind) = obj.get("type").and_then(|t| t.as_str()) {
                let code = obj
                    .get("code")
                    .map(|c| c.as_str().map_or_else(|| c.to_string(), str::to_string))
                    .unwrap_or_default();
                Some(format!("{kind}: {code}"))
            } else {
                serde_json::to_string(obj).ok()
            }
        }
        Some(other) if !other.is_null() => Some(other.to_string()),
        _ => value
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        self.kind.id()
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    #[instrument(
        skip(self, messages),
        fields(provider = %self.kind, message_count = messages.len())
    )]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f64>,
        model: &str,
    ) -> Result<ChatCompletion, GatewayError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| GatewayError::MissingApiKey(self.kind.display_name().to_string()))?;
        let model = if model.is_empty() { self.model.as_str() } else { model };

        let body = CompletionRequest {
            model,
            messages,
            stream: false,
            temperature,
        };

        debug!(url = %self.endpoint(), "sending chat completion");
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(REQUEST_TIMEOUT)
                } else {
                    GatewayError::NetworkError(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            let err = self.classify_failure(status, text, model);
            warn!(status, kind = err.error_kind(), error = %err, "provider returned error");
            return Err(err);
        }

        resp.json::<ChatCompletion>()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }
}
