//! Account handlers (creation, balance, history)

use std::sync::Arc;

use axum::extract::{Path, State};

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, created, ok};
use super::parse_account_id;
use crate::ledger::{Account, LedgerTransaction};

/// Create account
///
/// POST /v1/accounts
#[utoipa::path(
    post,
    path = "/v1/accounts",
    responses(
        (status = 201, description = "Account created with zero balance", body = Account, content_type = "application/json"),
        (status = 500, description = "Storage error")
    ),
    tag = "Account"
)]
pub async fn create_account(State(state): State<Arc<AppState>>) -> ApiResult<Account> {
    let account = state.ledger.create_account().await.map_err(ApiError::from)?;
    tracing::info!(account_id = %account.id, "Account created");
    created(account)
}

/// Get account balance
///
/// GET /v1/accounts/{id}
#[utoipa::path(
    get,
    path = "/v1/accounts/{id}",
    params(
        ("id" = String, Path, description = "Account id (UUID)")
    ),
    responses(
        (status = 200, description = "Account balance", body = Account, content_type = "application/json"),
        (status = 400, description = "Invalid account id"),
        (status = 404, description = "Account not found")
    ),
    tag = "Account"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Account> {
    let id = parse_account_id(&id)?;
    match state.ledger.get_account(&id).await? {
        Some(account) => ok(account),
        None => ApiError::not_found(format!("Account not found: {}", id)).into_err(),
    }
}

/// Account transaction history, oldest first
///
/// GET /v1/accounts/{id}/transactions
#[utoipa::path(
    get,
    path = "/v1/accounts/{id}/transactions",
    params(
        ("id" = String, Path, description = "Account id (UUID)")
    ),
    responses(
        (status = 200, description = "Transaction history", body = Vec<LedgerTransaction>, content_type = "application/json"),
        (status = 400, description = "Invalid account id"),
        (status = 404, description = "Account not found")
    ),
    tag = "Account"
)]
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<LedgerTransaction>> {
    let id = parse_account_id(&id)?;
    if state.ledger.get_account(&id).await?.is_none() {
        return ApiError::not_found(format!("Account not found: {}", id)).into_err();
    }
    ok(state.ledger.list_transactions(&id).await?)
}
