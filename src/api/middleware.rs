//! API Middleware
//!
//! Request logging.

use axum::{body::Body, http::Request, middleware::Next, response::Response};

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        request_id = ?request_id,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        request_id = ?request_id,
        "Request completed"
    );

    response
}
