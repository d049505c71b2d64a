use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub vector_index: String,
    pub keyword_index: String,
    pub passages: usize,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: env!("CARGO_PKG_NAME").into(),
    })
}

/// Ready when at least one index answers; retrieval degrades to the other.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let (vector, keyword) = state.retriever().counts().await;

    let describe = |count: Option<usize>| match count {
        Some(_) => "available".to_string(),
        None => "unavailable".to_string(),
    };
    let is_ready = vector.is_some() || keyword.is_some();

    let response = ReadinessResponse {
        status: if is_ready { "ready" } else { "not_ready" }.into(),
        vector_index: describe(vector),
        keyword_index: describe(keyword),
        passages: vector.or(keyword).unwrap_or(0),
    };

    if is_ready {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
