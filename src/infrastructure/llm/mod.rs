mod anthropic;
mod completion;
mod openai;

use std::sync::Arc;

pub use anthropic::AnthropicLlm;
pub use openai::OpenAiLlm;

use crate::domain::ports::LlmService;
use crate::infrastructure::config::{AppConfig, LlmProvider};

/// Picks the provider once for the lifetime of the process.
pub fn build_llm(config: &AppConfig) -> Arc<dyn LlmService> {
    let llm = &config.config.llm;
    let json_only = &config.prompts.json_only;
    match llm.provider {
        LlmProvider::OpenAi => {
            Arc::new(OpenAiLlm::from_config(llm).with_json_instruction(json_only))
        }
        LlmProvider::Anthropic => {
            Arc::new(AnthropicLlm::from_config(llm).with_json_instruction(json_only))
        }
    }
}
