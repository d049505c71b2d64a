use crate::domain::{errors::DomainError, AudioClip, RawTranscript, TranscriptionOptions};
use async_trait::async_trait;

#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(
        &self,
        clip: &AudioClip,
        options: &TranscriptionOptions,
    ) -> Result<RawTranscript, DomainError>;

    /// Whether the provider currently lists the configured model.
    async fn model_available(&self) -> Result<bool, DomainError>;
    fn model(&self) -> &str;
}
