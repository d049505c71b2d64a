use crate::domain::{Conversation, GenerationParameters, ResponseFormat};
use crate::infrastructure::config::LlmConfig;

/// Chooses generation settings from the conversation alone.
#[derive(Debug, Clone)]
pub struct ParameterSelector {
    default_temperature: f32,
    summarize_temperature: f32,
    default_max_tokens: u32,
    max_tokens_ceiling: u32,
    summarize_keywords: Vec<String>,
    long_conversation_messages: usize,
}

impl ParameterSelector {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            default_temperature: config.temperature,
            summarize_temperature: config.summarize_temperature,
            default_max_tokens: config.default_max_tokens,
            max_tokens_ceiling: config.max_tokens_ceiling,
            summarize_keywords: config
                .summarize_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            long_conversation_messages: config.long_conversation_messages,
        }
    }

    pub fn max_tokens_ceiling(&self) -> u32 {
        self.max_tokens_ceiling
    }

    pub fn is_summarize_request(&self, conversation: &Conversation) -> bool {
        conversation
            .last_user_message()
            .map(|m| {
                let lower = m.to_lowercase();
                self.summarize_keywords.iter().any(|k| lower.contains(k.as_str()))
            })
            .unwrap_or(false)
    }

    pub fn select(&self, conversation: &Conversation) -> GenerationParameters {
        let long = conversation.len() > self.long_conversation_messages;

        let params = if self.is_summarize_request(conversation) {
            GenerationParameters::new(
                self.summarize_temperature,
                self.max_tokens_ceiling,
                ResponseFormat::StructuredJson,
            )
        } else {
            let max_tokens = if long {
                self.max_tokens_ceiling
            } else {
                self.default_max_tokens
            };
            GenerationParameters::new(self.default_temperature, max_tokens, ResponseFormat::FreeText)
        };

        params.clamped(self.max_tokens_ceiling)
    }
}

impl Default for ParameterSelector {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}
