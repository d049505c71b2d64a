use crate::domain::{errors::DomainError, Conversation, Generation, GenerationParameters};
use async_trait::async_trait;

/// Transient failures map to `ProviderUnavailable`, the rest to `ProviderRejected`.
#[async_trait]
pub trait LlmService: Send + Sync {
    async fn generate(
        &self,
        system_instruction: &str,
        conversation: &Conversation,
        params: &GenerationParameters,
    ) -> Result<Generation, DomainError>;

    fn provider(&self) -> &'static str;
    fn model(&self) -> &str;
}
