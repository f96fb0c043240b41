//! HTTP handlers for the memory, models and chat endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use mnemo_core::messages::Role;
use mnemo_core::tokens::estimate_tokens;
use mnemo_engine::{ChatRequest, ChatTurn};
use mnemo_llm::hub::huggingface_models;
use mnemo_llm::models::{ProviderKind, DEFAULT_CONTEXT_LIMIT};
use mnemo_store::{NewMessage, SaveOutcome};

use crate::error::ApiError;
use crate::server::AppState;

/// Model used to estimate token counts of messages saved directly.
pub const SAVE_ESTIMATION_MODEL: &str = "gpt-3.5-turbo";

const DEFAULT_LIST_LIMIT: u32 = 100;
const DEFAULT_SEARCH_LIMIT: u32 = 20;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub is_summarization: Option<Value>,
}

fn is_set(flag: Option<&Value>) -> bool {
    match flag {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

pub async fn save_message(
    State(state): State<AppState>,
    Json(req): Json<SaveRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(role), Some(content)) = (
        req.role.filter(|r| !r.is_empty()),
        req.content.filter(|c| !c.is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "Invalid request. Role and content are required.".into(),
        ));
    };
    let role: Role = role.parse().map_err(|_| {
        ApiError::BadRequest(r#"Invalid role. Must be "user", "assistant", or "system"."#.into())
    })?;

    if is_set(req.is_summarization.as_ref()) {
        debug!("summarization message not saved");
        return Ok(Json(json!({
            "success": false,
            "skipped": true,
            "message": "Summarization messages are not saved to LTM",
        })));
    }

    let tokens = estimate_tokens(&content, SAVE_ESTIMATION_MODEL);
    let message = NewMessage::new(role, content)
        .in_session(req.session_id)
        .with_tokens(tokens);
    match state.store.save_message(message).await? {
        SaveOutcome::Saved { id } => Ok(Json(json!({ "success": true, "id": id }))),
        SaveOutcome::Skipped => Ok(Json(json!({ "success": false, "skipped": true }))),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub session_id: Option<String>,
    pub search: Option<String>,
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let messages = match q.search.filter(|s| !s.is_empty()) {
        Some(search) => state.store.search_messages(search, limit).await?,
        None => {
            state
                .store
                .get_messages(limit, q.offset.unwrap_or(0), q.session_id.filter(|s| !s.is_empty()))
                .await?
        }
    };
    Ok(Json(json!({ "success": true, "messages": messages })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<u32>,
}

pub async fn search_messages(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let query = q
        .q
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Query parameter q is required.".into()))?;
    let results = state
        .store
        .search_relevant(query, q.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        .await?;
    Ok(Json(json!({ "success": true, "results": results })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtmQuery {
    pub max_tokens: Option<u64>,
    pub offset_tokens: Option<u64>,
    pub q: Option<String>,
}

pub async fn ltm_page(
    State(state): State<AppState>,
    Query(q): Query<LtmQuery>,
) -> Result<Json<Value>, ApiError> {
    let max_tokens = q.max_tokens.unwrap_or(u64::from(DEFAULT_CONTEXT_LIMIT));
    let offset_tokens = q.offset_tokens.unwrap_or(0);
    let page = match q.q.filter(|s| !s.is_empty()) {
        Some(query) => state.store.ltm_search_page(query, max_tokens, offset_tokens).await?,
        None => state.store.ltm_page(max_tokens, offset_tokens).await?,
    };
    Ok(Json(json!({
        "success": true,
        "messages": page.messages,
        "totalTokens": page.total_tokens,
        "hasMore": page.has_more,
    })))
}

pub async fn reindex(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let indexed = state.store.rebuild_index().await?;
    info!(indexed, "full-text index rebuilt");
    Ok(Json(json!({ "success": true, "indexed": indexed })))
}

pub async fn clear_messages(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let deleted = state.store.clear_messages().await?;
    info!(deleted, "memory cleared");
    Ok(Json(json!({ "success": true, "deletedCount": deleted })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountQuery {
    pub session_id: Option<String>,
}

pub async fn message_count(
    State(state): State<AppState>,
    Query(q): Query<CountQuery>,
) -> Result<Json<Value>, ApiError> {
    let count = state
        .store
        .message_count(q.session_id.filter(|s| !s.is_empty()))
        .await?;
    Ok(Json(json!({ "success": true, "count": count })))
}

pub async fn memory_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let store = &state.store;
    let message_count = store.message_count(None).await?;
    let ltm_message_count = store.ltm_message_count().await?;
    let ltm_total_tokens = store.ltm_total_tokens().await?;
    let ids = store.id_range().await?;
    Ok(Json(json!({
        "success": true,
        "messageCount": message_count,
        "ltmMessageCount": ltm_message_count,
        "ltmTotalTokens": ltm_total_tokens,
        "minId": ids.min_id,
        "maxId": ids.max_id,
    })))
}

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let hf_models = huggingface_models(
        &state.http,
        &state.hub_models_url,
        state.settings.api_key(ProviderKind::HuggingFace),
    )
    .await;

    let providers: serde_json::Map<String, Value> = ProviderKind::ALL
        .into_iter()
        .map(|kind| {
            let models: Vec<String> = match kind {
                ProviderKind::DeepSeek => kind.catalog().iter().map(|m| m.to_string()).collect(),
                ProviderKind::HuggingFace => hf_models.clone(),
            };
            let entry = json!({
                "name": kind.display_name(),
                "models": models,
                "presets": kind.presets(),
            });
            (kind.id().to_string(), entry)
        })
        .collect();

    Json(json!({
        "providers": providers,
        "defaultProvider": state.chat.providers().default_provider(),
    }))
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<ChatTurn>, ApiError> {
    let request = ChatRequest::from_json(body)?;
    let turn = state.chat.handle(request).await?;
    Ok(Json(turn))
}
