use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Access log line per request; 5xx at error, 4xx at warn.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;

    match status {
        500.. => tracing::error!(%method, %path, status, duration_ms, "request completed"),
        400..=499 => tracing::warn!(%method, %path, status, duration_ms, "request completed"),
        _ => tracing::info!(%method, %path, status, duration_ms, "request completed"),
    }

    response
}
