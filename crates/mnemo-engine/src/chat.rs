use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use mnemo_core::ids::RequestId;
use mnemo_core::messages::{last_user_message, ChatMessage, Role};
use mnemo_core::provider::ChatCompletion;
use mnemo_core::tokens::estimate_tokens;
use mnemo_llm::registry::ProviderRegistry;
use mnemo_llm::usage::{extract_token_usage, TokenUsageReport};
use mnemo_store::{MessageStore, NewMessage, SaveOutcome};

use crate::commands::{parse_search_command, strip_search_commands};
use crate::error::EngineError;
use crate::ltm::retrieval::{retrieve, RetrievalRequest};
use crate::prompts::{assemble_system_prompt, with_system_prompt};
use crate::summarization::is_summarization_exchange;

/// Body of `POST /api/chat`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub use_memory: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_memory(mut self) -> Self {
        self.use_memory = true;
        self
    }

    /// Decode a raw JSON body, rejecting bodies without a `messages` array.
    pub fn from_json(body: serde_json::Value) -> Result<Self, EngineError> {
        if !body.get("messages").is_some_and(serde_json::Value::is_array) {
            return Err(EngineError::InvalidRequest(
                "Invalid request. Messages array is required.".into(),
            ));
        }
        serde_json::from_value(body).map_err(|e| EngineError::InvalidRequest(e.to_string()))
    }
}

/// Reply to a chat turn: the provider payload with the final text, plus
/// token accounting and memory flags.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    #[serde(flatten)]
    pub completion: ChatCompletion,
    pub token_usage: TokenUsageReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ltm_used: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ltm_messages_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ltm_empty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ltm_query: Option<String>,
}

impl ChatTurn {
    pub fn text(&self) -> &str {
        self.completion.text()
    }
}

/// What memory contributed to a turn.
enum MemoryTrace {
    Untouched,
    Used { count: usize, query: String },
    Empty { query: String },
}

/// Runs chat turns against the configured providers and long-term memory.
#[derive(Clone)]
pub struct ChatService {
    providers: ProviderRegistry,
    store: Arc<MessageStore>,
}

impl ChatService {
    pub fn new(providers: ProviderRegistry, store: Arc<MessageStore>) -> Self {
        Self { providers, store }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    #[instrument(
        skip_all,
        fields(
            request_id = %RequestId::new(),
            provider = tracing::field::Empty,
            model = tracing::field::Empty,
            use_memory = request.use_memory,
        )
    )]
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatTurn, EngineError> {
        let provider = self
            .providers
            .resolve(request.provider.as_deref())
            .ok_or_else(|| {
                EngineError::InvalidRequest(format!(
                    "no chat provider registered for '{}'",
                    request.provider.as_deref().unwrap_or(self.providers.default_provider())
                ))
            })?;
        let model = request
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());
        let span = tracing::Span::current();
        let _ = span.record("provider", provider.name());
        let _ = span.record("model", model.as_str());

        let messages = &request.messages;
        let last_user = last_user_message(messages);

        if request.use_memory {
            if let Some(user) = last_user.filter(|u| !u.is_summarization) {
                self.remember(Role::User, &user.content, &model).await;
            }
        }

        let system = assemble_system_prompt(request.use_memory, request.system_prompt.as_deref());
        let mut outbound = with_system_prompt(system.as_deref(), messages);

        let mut completion = provider
            .complete(&outbound, request.temperature, &model)
            .await?;
        let mut text = completion.text().to_string();
        info!(chars = text.len(), "provider replied");

        let mut trace = MemoryTrace::Untouched;
        if request.use_memory {
            if let Some(command) = parse_search_command(&text) {
                let user_text = last_user.map(|u| u.content.as_str());
                let query = command.resolve_query(user_text);
                let judge_query = user_text.unwrap_or(&query);
                debug!(%query, "memory search requested");

                let outcome = retrieve(
                    self.store.as_ref(),
                    provider.as_ref(),
                    RetrievalRequest::new(judge_query, &model),
                )
                .await;

                if outcome.relevant_messages.is_empty() {
                    trace = MemoryTrace::Empty { query };
                } else {
                    let mut extended = with_system_prompt(system.as_deref(), &[]);
                    extended.extend(
                        outcome
                            .relevant_messages
                            .iter()
                            .map(|m| ChatMessage::new(m.message.role, m.message.content.clone())),
                    );
                    extended.extend_from_slice(messages);

                    match provider.complete(&extended, request.temperature, &model).await {
                        Ok(retry) => {
                            if !retry.text().is_empty() {
                                text = retry.text().to_string();
                            }
                            completion = retry;
                            outbound = extended;
                            trace = MemoryTrace::Used {
                                count: outcome.relevant_messages.len(),
                                query,
                            };
                        }
                        Err(e) => {
                            warn!(
                                error = %e,
                                kind = e.error_kind(),
                                "memory re-submission failed, keeping first reply"
                            );
                        }
                    }
                }
                text = strip_search_commands(&text);
            }
        }

        if request.use_memory && !text.is_empty() {
            if is_summarization_exchange(last_user, Some(&text)) {
                debug!("summarization reply not remembered");
            } else {
                self.remember(Role::Assistant, &text, &model).await;
            }
        }

        let token_usage = extract_token_usage(&completion, &outbound, &text, &model);
        completion.set_text(text);

        let mut turn = ChatTurn {
            completion,
            token_usage,
            ltm_used: None,
            ltm_messages_count: None,
            ltm_empty: None,
            ltm_query: None,
        };
        match trace {
            MemoryTrace::Untouched => {}
            MemoryTrace::Used { count, query } => {
                turn.ltm_used = Some(true);
                turn.ltm_messages_count = Some(count);
                turn.ltm_query = Some(query);
            }
            MemoryTrace::Empty { query } => {
                turn.ltm_empty = Some(true);
                turn.ltm_query = Some(query);
            }
        }
        Ok(turn)
    }

    /// Save one side of the exchange. Failures are logged, never returned.
    async fn remember(&self, role: Role, content: &str, model: &str) {
        let tokens = estimate_tokens(content, model);
        let message = NewMessage::new(role, content).with_tokens(tokens);
        match self.store.save_message(message).await {
            Ok(SaveOutcome::Saved { id }) => debug!(%role, id, tokens, "saved to memory"),
            Ok(SaveOutcome::Skipped) => debug!(%role, "summarization message not saved"),
            Err(e) => warn!(%role, error = %e, "failed to save message to memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::errors::GatewayError;
    use mnemo_core::tokens::ProviderUsage;
    use mnemo_llm::mock::{MockProvider, MockResponse};
    use crate::prompts::MEMORY_SYSTEM_PROMPT;

    fn service(
        responses: Vec<MockResponse>,
    ) -> (ChatService, Arc<MockProvider>, Arc<MessageStore>) {
        let provider = Arc::new(MockProvider::new(responses));
        let registry = ProviderRegistry::new("mock").with(provider.clone());
        let store = Arc::new(MessageStore::in_memory());
        (ChatService::new(registry, store.clone()), provider, store)
    }

    async fn stored_contents(store: &MessageStore) -> Vec<(Role, String)> {
        store
            .get_messages(100, 0, None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect()
    }

    #[tokio::test]
    async fn plain_turn_passes_through() {
        let (svc, provider, store) = service(vec![MockResponse::text("Hello!")]);
        let turn = svc
            .handle(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();

        assert_eq!(turn.text(), "Hello!");
        assert!(turn.ltm_used.is_none());
        assert!(turn.ltm_empty.is_none());
        assert!(turn.token_usage.estimated);
        assert_eq!(turn.token_usage.max_context_tokens, 64_000);

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].messages, vec![ChatMessage::user("hi")]);
        assert_eq!(calls[0].model, "mock-model");
        assert_eq!(store.message_count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn request_model_and_temperature_forwarded() {
        let (svc, provider, _) = service(vec![MockResponse::text("ok")]);
        let mut req = ChatRequest::new(vec![ChatMessage::user("hi")]);
        req.model = Some("deepseek-reasoner".into());
        req.temperature = Some(0.9);
        req.system_prompt = Some("Be brief.".into());
        let _ = svc.handle(req).await.unwrap();

        let call = &provider.calls()[0];
        assert_eq!(call.model, "deepseek-reasoner");
        assert_eq!(call.temperature, Some(0.9));
        assert_eq!(call.messages[0], ChatMessage::system("Be brief."));
    }

    #[tokio::test]
    async fn memory_turn_saves_both_sides() {
        let (svc, provider, store) = service(vec![MockResponse::text("Nice to meet you.")]);
        let req = ChatRequest::new(vec![ChatMessage::user("My name is Ann")]).with_memory();
        let turn = svc.handle(req).await.unwrap();
        assert_eq!(turn.text(), "Nice to meet you.");

        assert_eq!(
            stored_contents(&store).await,
            vec![
                (Role::User, "My name is Ann".to_string()),
                (Role::Assistant, "Nice to meet you.".to_string()),
            ]
        );
        let saved = store.get_messages(100, 0, None).await.unwrap();
        assert!(saved.iter().all(|m| m.token_count.unwrap_or(0) > 0));

        let system = &provider.calls()[0].messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.starts_with(MEMORY_SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn summarization_exchange_not_remembered() {
        let (svc, _, store) = service(vec![MockResponse::text("Here you go.")]);
        let req = ChatRequest::new(vec![ChatMessage::user("Condense everything").summarization()])
            .with_memory();
        let _ = svc.handle(req).await.unwrap();
        assert_eq!(store.message_count(None).await.unwrap(), 0);

        let (svc, _, store) = service(vec![MockResponse::text("Context summary: lots")]);
        let req = ChatRequest::new(vec![ChatMessage::user("what now?")]).with_memory();
        let _ = svc.handle(req).await.unwrap();
        assert_eq!(
            stored_contents(&store).await,
            vec![(Role::User, "what now?".to_string())]
        );
    }

    #[tokio::test]
    async fn search_command_pulls_memory_into_context() {
        let (svc, provider, store) = service(vec![
            MockResponse::text("Let me check. **ltm_search**(home town)"),
            MockResponse::text("[0]"),
            MockResponse::text("You live in Kazan."),
        ]);
        let _ = store
            .save_message(NewMessage::new(Role::User, "I live in Kazan").with_tokens(4))
            .await
            .unwrap();

        let req = ChatRequest::new(vec![ChatMessage::user("Where do I live?")]).with_memory();
        let turn = svc.handle(req).await.unwrap();

        assert_eq!(turn.text(), "You live in Kazan.");
        assert_eq!(turn.ltm_used, Some(true));
        assert_eq!(turn.ltm_messages_count, Some(1));
        assert_eq!(turn.ltm_query.as_deref(), Some("home town"));
        assert!(turn.ltm_empty.is_none());

        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        // judge sees the user's question, not the command argument
        assert!(calls[1].messages[1].content.contains("\"Where do I live?\""));
        let resubmitted = &calls[2].messages;
        assert_eq!(resubmitted[0].role, Role::System);
        assert_eq!(resubmitted[1], ChatMessage::user("I live in Kazan"));
        assert_eq!(resubmitted[2], ChatMessage::user("Where do I live?"));

        let saved = stored_contents(&store).await;
        assert_eq!(saved.last().unwrap(), &(Role::Assistant, "You live in Kazan.".to_string()));
    }

    #[tokio::test]
    async fn empty_memory_search_strips_command() {
        let (svc, provider, _) = service(vec![
            MockResponse::text("I don't recall. **search**(\"old trip\")"),
            MockResponse::text("[]"),
        ]);
        let req = ChatRequest::new(vec![ChatMessage::user("Remember my trip?")]).with_memory();
        let turn = svc.handle(req).await.unwrap();

        assert_eq!(turn.text(), "I don't recall.");
        assert_eq!(turn.ltm_empty, Some(true));
        assert_eq!(turn.ltm_query.as_deref(), Some("old trip"));
        assert!(turn.ltm_used.is_none());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn numeric_command_query_reports_user_question() {
        let (svc, _, _) = service(vec![
            MockResponse::text("**ltm_search**(1, 2)"),
            MockResponse::text("[]"),
        ]);
        let req = ChatRequest::new(vec![ChatMessage::user("what did we plan?")]).with_memory();
        let turn = svc.handle(req).await.unwrap();
        assert_eq!(turn.ltm_query.as_deref(), Some("what did we plan?"));
        assert_eq!(turn.text(), "");
    }

    #[tokio::test]
    async fn command_ignored_without_memory() {
        let (svc, provider, _) = service(vec![MockResponse::text("**ltm_search**(x)")]);
        let turn = svc
            .handle(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();
        assert_eq!(turn.text(), "**ltm_search**(x)");
        assert!(turn.ltm_query.is_none());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_resubmission_keeps_first_reply() {
        let (svc, _, store) = service(vec![
            MockResponse::text("One moment **ltm_search**(cat)"),
            MockResponse::text("[0]"),
            MockResponse::Error(GatewayError::ServerError {
                status: 500,
                body: "boom".into(),
            }),
        ]);
        let _ = store
            .save_message(NewMessage::new(Role::User, "my cat is Tom").with_tokens(4))
            .await
            .unwrap();
        let req = ChatRequest::new(vec![ChatMessage::user("cat name?")]).with_memory();
        let turn = svc.handle(req).await.unwrap();
        assert_eq!(turn.text(), "One moment");
        assert!(turn.ltm_used.is_none());
        assert!(turn.ltm_empty.is_none());
    }

    #[tokio::test]
    async fn provider_usage_reported() {
        let completion = ChatCompletion::from_text("hi").with_usage(ProviderUsage {
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
        });
        let (svc, _, _) = service(vec![MockResponse::Completion(completion)]);
        let turn = svc
            .handle(ChatRequest::new(vec![ChatMessage::user("hey")]))
            .await
            .unwrap();
        assert!(!turn.token_usage.estimated);
        assert_eq!(turn.token_usage.total_tokens, 12);

        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["tokenUsage"]["total_tokens"], 12);
        assert_eq!(json["choices"][0]["message"]["content"], "hi");
        assert!(json.get("ltmUsed").is_none());
    }

    #[tokio::test]
    async fn gateway_error_propagates() {
        let (svc, _, _) = service(vec![MockResponse::Error(GatewayError::AuthenticationFailed(
            "bad key".into(),
        ))]);
        let err = svc
            .handle(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Gateway(GatewayError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn unknown_provider_uses_default() {
        let (svc, provider, _) = service(vec![MockResponse::text("ok")]);
        let mut req = ChatRequest::new(vec![ChatMessage::user("hi")]);
        req.provider = Some("nonexistent".into());
        let _ = svc.handle(req).await.unwrap();
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn no_provider_is_invalid_request() {
        let svc = ChatService::new(
            ProviderRegistry::new("deepseek"),
            Arc::new(MessageStore::in_memory()),
        );
        let err = svc
            .handle(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[test]
    fn request_requires_messages_array() {
        let err = ChatRequest::from_json(serde_json::json!({"temperature": 0.5})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request. Messages array is required.");
        assert!(ChatRequest::from_json(serde_json::json!({"messages": "hi"})).is_err());

        let req = ChatRequest::from_json(serde_json::json!({
            "messages": [{"role": "user", "content": "hi", "isSummarization": 1}],
            "systemPrompt": "Be brief.",
            "useMemory": true,
            "provider": "huggingface"
        }))
        .unwrap();
        assert!(req.use_memory);
        assert!(req.messages[0].is_summarization);
        assert_eq!(req.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(req.provider.as_deref(), Some("huggingface"));
    }
}
