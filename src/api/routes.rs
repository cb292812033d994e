//! API Routes
//!
//! HTTP endpoint definitions. Write endpoints only publish a command; its
//! outcome is applied asynchronously by the consistency handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatcher::CommandDispatcher;
use crate::domain::{Command, LedgerRecord};
use crate::error::{AppError, AppResult};
use crate::store::{BalanceStore, LedgerStore};

/// Shared state of the HTTP surface
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: CommandDispatcher,
    pub balances: Arc<dyn BalanceStore>,
    pub ledger: Arc<dyn LedgerStore>,
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct AmountRequest {
    pub user_id: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandAcceptedResponse {
    pub user_id: String,
    pub topic: String,
    pub status: String,
    pub issued_at: DateTime<Utc>,
}

impl From<&Command> for CommandAcceptedResponse {
    fn from(command: &Command) -> Self {
        Self {
            user_id: command.user_id().to_string(),
            topic: command.topic().to_string(),
            status: "accepted".to_string(),
            issued_at: command.issued_at(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub records: Vec<LedgerRecord>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/balance", get(get_balance).post(create_account))
        .route("/balance/add", post(add_amount))
        .route("/balance/deduct", post(deduct_amount))
        .route("/balance/history", get(get_history))
}

// =========================================================================
// Validation
// =========================================================================

fn require_user_id(user_id: Option<String>) -> AppResult<String> {
    match user_id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(AppError::InvalidRequest("user_id is required".to_string())),
    }
}

fn validate_amount(request: &AmountRequest, must_be_positive: bool) -> AppResult<()> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::InvalidRequest("user_id is required".to_string()));
    }
    if !request.amount.is_finite() {
        return Err(AppError::InvalidRequest("amount must be a finite number".to_string()));
    }
    if must_be_positive && request.amount <= 0.0 {
        return Err(AppError::InvalidRequest("amount must be positive".to_string()));
    }
    Ok(())
}

fn accepted(command: &Command) -> (StatusCode, Json<CommandAcceptedResponse>) {
    (StatusCode::ACCEPTED, Json(CommandAcceptedResponse::from(command)))
}

// =========================================================================
// Handlers
// =========================================================================

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /balance?user_id=
async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<BalanceResponse>> {
    let user_id = require_user_id(query.user_id)?;
    let balance = state.balances.read(&user_id).await?;

    Ok(Json(BalanceResponse { user_id, balance }))
}

/// POST /balance
async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<AmountRequest>,
) -> AppResult<(StatusCode, Json<CommandAcceptedResponse>)> {
    validate_amount(&request, false)?;
    let command = state
        .dispatcher
        .create_account(&request.user_id, request.amount)
        .await?;

    Ok(accepted(&command))
}

/// POST /balance/add
async fn add_amount(
    State(state): State<AppState>,
    Json(request): Json<AmountRequest>,
) -> AppResult<(StatusCode, Json<CommandAcceptedResponse>)> {
    validate_amount(&request, true)?;
    let command = state
        .dispatcher
        .add_amount(&request.user_id, request.amount)
        .await?;

    Ok(accepted(&command))
}

/// POST /balance/deduct
async fn deduct_amount(
    State(state): State<AppState>,
    Json(request): Json<AmountRequest>,
) -> AppResult<(StatusCode, Json<CommandAcceptedResponse>)> {
    validate_amount(&request, true)?;
    let command = state
        .dispatcher
        .deduct_amount(&request.user_id, request.amount)
        .await?;

    Ok(accepted(&command))
}

/// GET /balance/history?user_id=
async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<HistoryResponse>> {
    let user_id = require_user_id(query.user_id)?;
    let records = state.ledger.query(&user_id).await?;

    Ok(Json(HistoryResponse { user_id, records }))
}
