use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use mnemo_core::errors::GatewayError;
use mnemo_core::messages::ChatMessage;
use mnemo_core::provider::{ChatCompletion, ChatProvider};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Reply with a single assistant message.
    Text(String),
    /// Reply with a full completion payload (usage, extra fields).
    Completion(ChatCompletion),
    /// Fail the call.
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// One recorded `complete` call.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub model: String,
}

/// Mock provider that returns pre-programmed responses in sequence and
/// records every request it receives.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    fallback: Option<MockResponse>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `response` once the scripted queue is empty.
    pub fn repeating(mut self, response: MockResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f64>,
        model: &str,
    ) -> Result<ChatCompletion, GatewayError> {
        let idx = {
            let mut calls = self.calls.lock();
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                temperature,
                model: model.to_string(),
            });
            calls.len() - 1
        };

        let next = self.responses.lock().pop_front().or_else(|| self.fallback.clone());
        match next {
            Some(response) => resolve_response(response).await,
            None => Err(GatewayError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            ))),
        }
    }
}

/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_response(response: MockResponse) -> Result<ChatCompletion, GatewayError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Text(text) => return Ok(ChatCompletion::from_text(text)),
            MockResponse::Completion(completion) => return Ok(completion),
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}
