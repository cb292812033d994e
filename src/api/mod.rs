//! API module
//!
//! HTTP command submission and read endpoints.

pub mod middleware;
pub mod routes;

use axum::{middleware as axum_middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use routes::{create_router, AppState};

/// Build the full application router with its middleware stack
pub fn build_app(state: AppState) -> Router {
    // Layers run bottom-up: request id -> trace -> cors -> logging -> handler
    create_router()
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
