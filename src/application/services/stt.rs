use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

use crate::domain::{
    ports::TranscriptionService, AudioClip, DomainError, Transcript, TranscriptionOptions,
};
use crate::infrastructure::config::AppConfig;

/// Accepted media types and the extension sent upstream for each.
pub const SUPPORTED_FORMATS: &[(&str, &str)] = &[
    ("audio/mpeg", "mp3"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/mp4", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/webm", "webm"),
    ("audio/ogg", "ogg"),
    ("audio/flac", "flac"),
];

/// Frequent mis-hearings of eye-care terms, matched as whole words.
const MEDICAL_CORRECTIONS: &[(&str, &str)] = &[
    ("myope", "myopia"),
    ("hyper opia", "hyperopia"),
    ("astigmat", "astigmatism"),
    ("glau coma", "glaucoma"),
    ("ophthalmo", "ophthalmology"),
    ("dioptre", "diopter"),
    ("eye pressure", "intraocular pressure"),
];

#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub data: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SttHealth {
    pub status: &'static str,
    pub model: String,
    pub model_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatGuide {
    pub supported_formats: Vec<&'static str>,
    pub max_file_size_mb: usize,
    pub min_file_size_bytes: usize,
    pub recommended_formats: Vec<&'static str>,
    pub supported_languages: Vec<String>,
    pub tips: Vec<&'static str>,
}

pub struct SttService {
    transcriber: Arc<dyn TranscriptionService>,
    medical_prompt: String,
    max_file_size: usize,
    min_file_size: usize,
    default_language: String,
    supported_languages: Vec<String>,
    timeout: Duration,
}

impl SttService {
    pub fn from_config(transcriber: Arc<dyn TranscriptionService>, config: &AppConfig) -> Self {
        let stt = &config.config.stt;
        Self {
            transcriber,
            medical_prompt: config.prompts.stt_medical.clone(),
            max_file_size: stt.max_file_size_bytes,
            min_file_size: stt.min_file_size_bytes,
            default_language: stt.default_language.to_lowercase(),
            supported_languages: stt
                .supported_languages
                .iter()
                .map(|l| l.to_lowercase())
                .collect(),
            timeout: Duration::from_secs(stt.timeout_seconds),
        }
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    #[instrument(skip(self, upload, prompt), fields(size = upload.data.len(), content_type = ?upload.content_type))]
    pub async fn transcribe(
        &self,
        upload: AudioUpload,
        language: Option<String>,
        prompt: Option<String>,
    ) -> Result<Transcript, DomainError> {
        let started = Instant::now();

        let content_type = self.validate(&upload)?;
        let language = self.resolve_language(language)?;
        let extension = file_extension(&content_type, &upload.data);
        let filename = upload
            .filename
            .clone()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| format!("audio.{extension}"));

        let options = TranscriptionOptions {
            language,
            prompt: Some(self.build_prompt(prompt.as_deref())),
        };
        let clip = AudioClip {
            data: upload.data,
            filename: upload_name(&filename, extension),
            content_type,
        };

        let raw = tokio::time::timeout(self.timeout, self.transcriber.transcribe(&clip, &options))
            .await
            .map_err(|_| DomainError::timeout("transcription timed out"))?
            .inspect_err(|e| tracing::error!(error = %e, "transcription failed"))?;

        let original_text = raw.text.trim().to_string();
        let text = apply_medical_corrections(&original_text);
        let processing_time = started.elapsed().as_secs_f64();

        tracing::info!(
            chars = text.len(),
            language = ?raw.language,
            processing_time,
            "transcription complete"
        );

        Ok(Transcript {
            word_count: text.split_whitespace().count(),
            confidence: raw.confidence(),
            language: raw.language.clone().or(options.language),
            duration: raw.duration,
            filename: Some(filename),
            processing_time: Some(processing_time),
            original_text,
            text,
        })
    }

    fn validate(&self, upload: &AudioUpload) -> Result<String, DomainError> {
        let content_type = upload
            .content_type
            .as_deref()
            .map(normalize_media_type)
            .unwrap_or_default();

        if !SUPPORTED_FORMATS.iter().any(|(mime, _)| *mime == content_type) {
            let shown = if content_type.is_empty() { "none" } else { content_type.as_str() };
            return Err(DomainError::unsupported_media_type(format!(
                "unsupported audio format: {shown}. Supported formats: {}",
                supported_mimes().join(", ")
            )));
        }

        let size = upload.data.len();
        if size > self.max_file_size {
            return Err(DomainError::payload_too_large(format!(
                "file too large: {size} bytes (max {} MB)",
                self.max_file_size / (1024 * 1024)
            )));
        }
        if size < self.min_file_size {
            return Err(DomainError::validation(format!(
                "file too small: {size} bytes (min {} bytes)",
                self.min_file_size
            )));
        }

        Ok(content_type)
    }

    fn resolve_language(&self, language: Option<String>) -> Result<Option<String>, DomainError> {
        let language = language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.default_language.clone());

        if !self.supported_languages.contains(&language) {
            return Err(DomainError::validation(format!(
                "unsupported language '{language}'. Supported: {}",
                self.supported_languages.join(", ")
            )));
        }

        Ok((language != "auto").then_some(language))
    }

    fn build_prompt(&self, extra: Option<&str>) -> String {
        match extra.map(str::trim).filter(|p| !p.is_empty()) {
            Some(extra) => format!("{} Additional context: {extra}", self.medical_prompt.trim()),
            None => self.medical_prompt.trim().to_string(),
        }
    }

    pub async fn health(&self) -> SttHealth {
        match self.transcriber.model_available().await {
            Ok(available) => SttHealth {
                status: if available { "healthy" } else { "unhealthy" },
                model: self.transcriber.model().to_string(),
                model_available: available,
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "transcription health check failed");
                SttHealth {
                    status: "unhealthy",
                    model: self.transcriber.model().to_string(),
                    model_available: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn supported_formats(&self) -> FormatGuide {
        FormatGuide {
            supported_formats: supported_mimes(),
            max_file_size_mb: self.max_file_size / (1024 * 1024),
            min_file_size_bytes: self.min_file_size,
            recommended_formats: vec!["audio/webm", "audio/mp4", "audio/wav"],
            supported_languages: self.supported_languages.clone(),
            tips: vec![
                "Record in a quiet environment",
                "Speak clearly at a normal pace",
                "Keep the microphone close to the speaker",
                "Split long consultations into shorter recordings",
            ],
        }
    }
}

fn supported_mimes() -> Vec<&'static str> {
    SUPPORTED_FORMATS.iter().map(|(mime, _)| *mime).collect()
}

/// Lowercases and drops parameters such as `;codecs=opus`.
fn normalize_media_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

fn file_extension(content_type: &str, data: &[u8]) -> &'static str {
    SUPPORTED_FORMATS
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
        .unwrap_or_else(|| sniff_extension(data))
}

fn sniff_extension(data: &[u8]) -> &'static str {
    if data.starts_with(b"RIFF") {
        "wav"
    } else if data.starts_with(b"OggS") {
        "ogg"
    } else if data.starts_with(b"fLaC") {
        "flac"
    } else {
        // ID3 tags, ftyp boxes and anything unrecognised
        "mp3"
    }
}

fn upload_name(filename: &str, extension: &str) -> String {
    if std::path::Path::new(filename).extension().is_some() {
        filename.to_string()
    } else {
        format!("{filename}.{extension}")
    }
}

pub(crate) fn apply_medical_corrections(text: &str) -> String {
    MEDICAL_CORRECTIONS
        .iter()
        .fold(text.to_string(), |acc, (from, to)| replace_whole_word(&acc, from, to))
}

fn replace_whole_word(text: &str, from: &str, to: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for (start, _) in lower.match_indices(from) {
        let end = start + from.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        let bounded = !before.is_some_and(char::is_alphanumeric)
            && !after.is_some_and(char::is_alphanumeric);

        if bounded {
            out.push_str(&text[last..start]);
            out.push_str(to);
            last = end;
        }
    }

    out.push_str(&text[last..]);
    out
}
