use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::providers::openai;
use std::time::Duration;

use super::completion;
use crate::domain::{ports::LlmService, Conversation, DomainError, Generation, GenerationParameters};
use crate::infrastructure::config::LlmConfig;

/// OpenAI chat completions. The client reads `OPENAI_API_KEY` from the environment.
pub struct OpenAiLlm {
    client: openai::Client,
    model: String,
    json_instruction: String,
    timeout: Duration,
}

impl OpenAiLlm {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: openai::Client::from_env(),
            model: model.into(),
            json_instruction: "Respond with valid JSON only.".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(&config.openai_model).with_timeout(Duration::from_secs(config.timeout_seconds))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_json_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.json_instruction = instruction.into();
        self
    }
}

#[async_trait]
impl LlmService for OpenAiLlm {
    #[tracing::instrument(skip_all, fields(model = %self.model, max_tokens = params.max_tokens))]
    async fn generate(
        &self,
        system_instruction: &str,
        conversation: &Conversation,
        params: &GenerationParameters,
    ) -> Result<Generation, DomainError> {
        let json = params.wants_json().then_some(self.json_instruction.as_str());
        let prepared = completion::prepare(system_instruction, conversation, json)?;
        let model = self.client.completion_model(&self.model);

        let generation = completion::send(&model, prepared, params, self.timeout).await?;
        tracing::info!(
            input_tokens = generation.usage.input_tokens,
            output_tokens = generation.usage.output_tokens,
            "openai generation completed"
        );
        Ok(generation)
    }

    fn provider(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
