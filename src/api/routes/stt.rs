use axum::{
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::{error::ApiError, state::AppState};
use crate::application::services::{FormatGuide, SttHealth};
use crate::application::AudioUpload;
use crate::domain::{DomainError, Transcript};

const AUDIO_FIELD: &str = "audio";

#[derive(Debug, Default, Deserialize)]
pub struct TranscribeParams {
    pub language: Option<String>,
    pub prompt: Option<String>,
}

pub async fn transcribe(
    State(state): State<AppState>,
    Query(params): Query<TranscribeParams>,
    mut multipart: Multipart,
) -> Result<Json<Transcript>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("invalid multipart body", e))?
    {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error("could not read audio field", e))?;

        upload = Some(AudioUpload {
            data: data.to_vec(),
            filename,
            content_type,
        });
        break;
    }

    let upload = upload.ok_or_else(|| {
        DomainError::validation(format!("multipart field '{AUDIO_FIELD}' is required"))
    })?;

    let transcript = state
        .stt
        .transcribe(upload, params.language, params.prompt)
        .await?;

    Ok(Json(transcript))
}

/// Body-limit overruns surface as file-too-large like any other oversized upload.
fn multipart_error(context: &str, err: MultipartError) -> DomainError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        DomainError::payload_too_large(format!("{context}: {}", err.body_text()))
    } else {
        DomainError::validation(format!("{context}: {}", err.body_text()))
    }
}

pub async fn stt_health(State(state): State<AppState>) -> Json<SttHealth> {
    Json(state.stt.health().await)
}

pub async fn supported_formats(State(state): State<AppState>) -> Json<FormatGuide> {
    Json(state.stt.supported_formats())
}
