//! Error handling module
//!
//! HTTP-facing error type and its JSON response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::bus::BusError;
use crate::store::{BalanceError, LedgerStoreError};

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Server errors (5xx)
    #[error("Command could not be published: {0}")]
    Publish(#[from] BusError),

    #[error("Balance read failed: {0}")]
    BalanceRead(#[from] BalanceError),

    #[error("Ledger read failed: {0}")]
    LedgerRead(#[from] LedgerStoreError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 503 Service Unavailable
            AppError::Publish(e) => {
                tracing::error!(error = %e, "Bus publish failed");
                (StatusCode::SERVICE_UNAVAILABLE, "publish_failed", None)
            }

            // 500 Internal Server Error
            AppError::BalanceRead(e) => {
                tracing::error!("Balance read error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "balance_read_error", None)
            }
            AppError::LedgerRead(e) => {
                tracing::error!("Ledger read error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "ledger_read_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
