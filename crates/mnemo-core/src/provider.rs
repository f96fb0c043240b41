use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::messages::ChatMessage;
use crate::tokens::ProviderUsage;

/// Assistant message inside a completion choice.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ChoiceMessage,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Non-streaming chat completion payload.
///
/// Fields this crate does not model (`id`, `created`, `finish_reason`, ...)
/// are kept in `extra` so the payload can be passed through to clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ProviderUsage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatCompletion {
    /// Completion with a single assistant choice and no usage block.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ChoiceMessage {
                    role: Some("assistant".into()),
                    content: Some(text.into()),
                    extra: serde_json::Map::new(),
                },
                extra: serde_json::Map::new(),
            }],
            usage: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_usage(mut self, usage: ProviderUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Content of the first choice, or `""`.
    pub fn text(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("")
    }

    /// Replace the content of the first choice, creating it if absent.
    pub fn set_text(&mut self, text: impl Into<String>) {
        if self.choices.is_empty() {
            self.choices.push(Choice::default());
        }
        if let Some(first) = self.choices.first_mut() {
            first.message.content = Some(text.into());
        }
    }
}

/// An opaque chat-completion backend (DeepSeek, Hugging Face router, mocks).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f64>,
        model: &str,
    ) -> Result<ChatCompletion, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openai_shape_and_keeps_extra_fields() {
        let raw = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
        });
        let completion: ChatCompletion = serde_json::from_value(raw).unwrap();
        assert_eq!(completion.text(), "hi");
        assert_eq!(completion.usage.as_ref().unwrap().total_tokens, 6);
        assert_eq!(completion.extra["id"], "chatcmpl-1");
        assert_eq!(completion.choices[0].extra["finish_reason"], "stop");

        let back = serde_json::to_value(&completion).unwrap();
        assert_eq!(back["object"], "chat.completion");
        assert_eq!(back["choices"][0]["index"], 0);
    }

    #[test]
    fn missing_usage_is_none() {
        let completion: ChatCompletion =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"x"}}]}"#).unwrap();
        assert!(completion.usage.is_none());
        assert_eq!(completion.text(), "x");
    }

    #[test]
    fn text_of_empty_completion() {
        assert_eq!(ChatCompletion::default().text(), "");
    }

    #[test]
    fn set_text_replaces_first_choice() {
        let mut completion = ChatCompletion::from_text("before");
        completion.set_text("after");
        assert_eq!(completion.text(), "after");

        let mut empty = ChatCompletion::default();
        empty.set_text("created");
        assert_eq!(empty.text(), "created");
    }
}
