use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::{error::ApiError, state::AppState};
use crate::domain::{ChatReply, Conversation, TokenUsage};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Conversation,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub thread_id: String,
    pub sources: Vec<String>,
    pub cached: bool,
    pub grounded: bool,
    pub usage: TokenUsage,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            reply: reply.text,
            thread_id: reply.thread_id,
            sources: reply.sources,
            cached: reply.cached,
            grounded: reply.grounded,
            usage: reply.usage,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatHealthResponse {
    pub status: &'static str,
    pub provider: &'static str,
    pub model: String,
    pub vector_passages: Option<usize>,
    pub keyword_passages: Option<usize>,
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = state
        .chat
        .process_chat(
            request.messages,
            request.thread_id,
            request.max_tokens,
            request.temperature,
        )
        .await?;

    Ok(Json(reply.into()))
}

pub async fn chat_health(State(state): State<AppState>) -> Json<ChatHealthResponse> {
    let (vector_passages, keyword_passages) = state.retriever().counts().await;
    let status = if vector_passages.is_some() || keyword_passages.is_some() {
        "healthy"
    } else {
        "degraded"
    };

    Json(ChatHealthResponse {
        status,
        provider: state.chat.provider(),
        model: state.chat.model().to_string(),
        vector_passages,
        keyword_passages,
    })
}
