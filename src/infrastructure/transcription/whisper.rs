use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::{
    ports::TranscriptionService, AudioClip, DomainError, RawTranscript, TranscriptionOptions,
};
use crate::infrastructure::config::SttConfig;

/// Headroom over the service deadline.
const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(10);

/// OpenAI-compatible `/audio/transcriptions` client.
pub struct WhisperTranscription {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl WhisperTranscription {
    pub fn new(config: &SttConfig, api_key: impl Into<String>) -> Result<Self, DomainError> {
        let http = reqwest::Client::builder()
            .timeout(client_timeout(config))
            .build()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
        })
    }

    fn map_send_error(e: reqwest::Error) -> DomainError {
        if e.is_timeout() {
            DomainError::timeout("transcription timed out")
        } else {
            DomainError::provider_unavailable(format!("Transcription provider unreachable: {e}"))
        }
    }
}

fn client_timeout(config: &SttConfig) -> Duration {
    Duration::from_secs(config.timeout_seconds) + CLIENT_TIMEOUT_GRACE
}

/// 429 and 5xx are transient; other non-success codes are permanent.
fn map_status(status: StatusCode, body: &str) -> DomainError {
    let msg = format!("transcription provider returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        DomainError::provider_unavailable(msg)
    } else {
        DomainError::provider_rejected(msg)
    }
}

#[async_trait]
impl TranscriptionService for WhisperTranscription {
    #[tracing::instrument(skip_all, fields(filename = %clip.filename, bytes = clip.data.len()))]
    async fn transcribe(
        &self,
        clip: &AudioClip,
        options: &TranscriptionOptions,
    ) -> Result<RawTranscript, DomainError> {
        let part = Part::bytes(clip.data.clone())
            .file_name(clip.filename.clone())
            .mime_str(&clip.content_type)
            .map_err(|e| DomainError::validation(e.to_string()))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("temperature", "0");
        if let Some(language) = &options.language {
            form = form.text("language", language.clone());
        }
        if let Some(prompt) = &options.prompt {
            form = form.text("prompt", prompt.clone());
        }

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        response
            .json::<RawTranscript>()
            .await
            .map_err(|e| DomainError::external(format!("Invalid transcription response: {e}")))
    }

    async fn model_available(&self) -> Result<bool, DomainError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        let models: ModelList = response
            .json()
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(models.data.iter().any(|m| m.id == self.model || m.id.starts_with("whisper")))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status_separates_transient_failures() {
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            DomainError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, ""),
            DomainError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, "invalid file"),
            DomainError::ProviderRejected(_)
        ));
    }

    #[test]
    fn test_client_timeout_outlasts_service_deadline() {
        let config = SttConfig {
            timeout_seconds: 30,
            ..SttConfig::default()
        };
        assert!(client_timeout(&config) > Duration::from_secs(config.timeout_seconds));
    }

    #[test]
    fn test_verbose_json_response_parses() {
        let body = r#"{
            "task": "transcribe",
            "language": "thai",
            "duration": 3.2,
            "text": "ผมมีปัญหาสายตาสั้น",
            "segments": [{"id": 0, "text": "ผมมีปัญหาสายตาสั้น", "avg_logprob": -0.1}]
        }"#;
        let raw: RawTranscript = serde_json::from_str(body).unwrap();

        assert_eq!(raw.language.as_deref(), Some("thai"));
        assert_eq!(raw.segments.len(), 1);
        assert!((raw.confidence().unwrap() - 0.9).abs() < 1e-9);
    }
}
