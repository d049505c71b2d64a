use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::DomainError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}

/// HTTP face of a [`DomainError`].
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::Validation(_) => StatusCode::BAD_REQUEST,
            DomainError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            DomainError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::RetrievalUnavailable(_) | DomainError::ProviderUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DomainError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DomainError::ProviderRejected(_) => StatusCode::BAD_GATEWAY,
            DomainError::Internal(_) | DomainError::ExternalService(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match &self.0 {
            DomainError::Validation(_) => "validation_error",
            DomainError::PayloadTooLarge(_) => "file_too_large",
            DomainError::UnsupportedMediaType(_) => "unsupported_media_type",
            DomainError::NotFound(_) => "not_found",
            DomainError::RetrievalUnavailable(_) => "retrieval_unavailable",
            DomainError::ProviderUnavailable(_) => "provider_unavailable",
            DomainError::ProviderRejected(_) => "provider_rejected",
            DomainError::Timeout(_) => "timeout",
            DomainError::Internal(_) | DomainError::ExternalService(_) => "internal_error",
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.0.is_client_error() {
            tracing::warn!(error = %self.0, status = status.as_u16(), "request rejected");
        } else {
            tracing::error!(error = %self.0, status = status.as_u16(), "request failed");
        }

        let body = ErrorBody {
            error: self.kind(),
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
