use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use super::context::format_context;
use super::parameters::ParameterSelector;
use super::retrieval::HybridRetriever;
use super::single_flight::SingleFlight;
use crate::domain::{
    ports::LlmService, ChatReply, Conversation, DomainError, GenerationParameters, TokenUsage,
};
use crate::infrastructure::config::{AppConfig, PromptsConfig};

#[derive(Debug, Clone)]
struct Answer {
    text: String,
    sources: Vec<String>,
    grounded: bool,
    usage: TokenUsage,
}

struct Pipeline {
    retriever: Arc<HybridRetriever>,
    llm: Arc<dyn LlmService>,
    prompts: PromptsConfig,
    max_docs: usize,
}

impl Pipeline {
    async fn answer(
        &self,
        conversation: &Conversation,
        params: &GenerationParameters,
    ) -> Result<Answer, DomainError> {
        let query = conversation
            .last_user_message()
            .ok_or_else(|| DomainError::validation("Conversation has no user message"))?;

        let retrieval = self.retriever.retrieve(query, self.max_docs).await?;
        let context = format_context(&retrieval);
        let grounded = !context.is_empty();
        if !grounded {
            tracing::warn!("no passages retrieved; generating without grounding context");
        }

        let system = build_system_instruction(&self.prompts, &context, params.wants_json());
        let generation = self.llm.generate(&system, conversation, params).await?;

        let text = if params.wants_json() {
            extract_json(&generation.text).unwrap_or_else(|| generation.text.trim().to_string())
        } else {
            generation.text.trim().to_string()
        };

        Ok(Answer {
            text,
            sources: retrieval.passage_ids(),
            grounded,
            usage: generation.usage,
        })
    }
}

pub struct ChatService {
    pipeline: Arc<Pipeline>,
    selector: ParameterSelector,
    flights: SingleFlight<Answer>,
}

impl ChatService {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        llm: Arc<dyn LlmService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                retriever,
                llm,
                prompts: config.prompts.clone(),
                max_docs: config.config.retrieval.max_docs,
            }),
            selector: ParameterSelector::from_config(&config.config.llm),
            flights: SingleFlight::new(Duration::from_secs(config.config.chat.dedup_window_seconds)),
        }
    }

    pub fn provider(&self) -> &'static str {
        self.pipeline.llm.provider()
    }

    pub fn model(&self) -> &str {
        self.pipeline.llm.model()
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.pipeline.retriever
    }

    #[instrument(skip_all, fields(messages = conversation.len()))]
    pub async fn process_chat(
        &self,
        conversation: Conversation,
        thread_id: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<ChatReply, DomainError> {
        validate_conversation(&conversation)?;

        let thread_id = thread_id
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let params = self.selector.select(&conversation).with_overrides(
            max_tokens,
            temperature,
            self.selector.max_tokens_ceiling(),
        );
        let key = fingerprint(&conversation, &params)?;

        let pipeline = self.pipeline.clone();
        let flight = self
            .flights
            .run(&key, move || async move { pipeline.answer(&conversation, &params).await })
            .await;

        let answer = flight.result.inspect_err(|e| {
            if e.is_transient() {
                tracing::warn!(error = %e, shared = flight.shared, "chat generation unavailable");
            } else {
                tracing::error!(error = %e, shared = flight.shared, "chat generation failed");
            }
        })?;

        tracing::info!(
            thread_id = %thread_id,
            sources = answer.sources.len(),
            grounded = answer.grounded,
            cached = flight.shared,
            total_tokens = answer.usage.total_tokens,
            "chat processed"
        );

        Ok(ChatReply {
            text: answer.text,
            thread_id,
            sources: answer.sources,
            cached: flight.shared,
            grounded: answer.grounded,
            usage: answer.usage,
            created_at: Utc::now(),
        })
    }
}

fn validate_conversation(conversation: &Conversation) -> Result<(), DomainError> {
    if conversation.is_empty() {
        return Err(DomainError::validation("messages must not be empty"));
    }
    match conversation.last_user_message() {
        Some(m) if !m.trim().is_empty() => Ok(()),
        Some(_) => Err(DomainError::validation("the latest user message is empty")),
        None => Err(DomainError::validation("messages must contain a user message")),
    }
}

/// SHA-256 over the conversation and the effective parameters.
fn fingerprint(
    conversation: &Conversation,
    params: &GenerationParameters,
) -> Result<String, DomainError> {
    let bytes = serde_json::to_vec(&(conversation, params))
        .map_err(|e| DomainError::internal(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

pub(crate) fn build_system_instruction(prompts: &PromptsConfig, context: &str, json: bool) -> String {
    let mut instruction = prompts.system.trim().to_string();

    if context.is_empty() {
        instruction.push_str("\n\n");
        instruction.push_str(prompts.no_context.trim());
    } else {
        instruction.push_str("\n\n");
        instruction.push_str(prompts.context_header.trim());
        instruction.push_str("\n\n<context>\n");
        instruction.push_str(context);
        instruction.push_str("\n</context>");
    }

    if json {
        instruction.push_str("\n\n");
        instruction.push_str(prompts.summarize.trim());
    }

    instruction
}

/// First JSON object in a model reply, with or without code fences.
pub(crate) fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok_and(|v| v.is_object()) {
        return Some(trimmed.to_string());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &trimmed[start..=end];
    serde_json::from_str::<serde_json::Value>(candidate)
        .ok()
        .filter(|v| v.is_object())
        .map(|_| candidate.to_string())
}
