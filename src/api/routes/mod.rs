pub mod chat;
pub mod health;
pub mod stt;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::{middleware, routing::get, routing::post, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{middleware::request_logger, state::AppState};

/// Multipart framing allowance on top of the audio size ceiling, so oversized
/// files still reach validation and get a proper error.
const MULTIPART_HEADROOM: usize = 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    let cors = build_cors(&state.config.config.cors.allowed_origins);
    let upload_limit = state.stt.max_file_size() + MULTIPART_HEADROOM;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/chat", chat_routes())
        .nest("/stt", stt_routes(upload_limit))
        .layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}

fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(chat::chat_handler))
        .route("/chat-rag", post(chat::chat_handler))
        .route("/health", get(chat::chat_health))
}

fn stt_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/transcribe",
            post(stt::transcribe).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/health", get(stt::stt_health))
        .route("/supported-formats", get(stt::supported_formats))
}
