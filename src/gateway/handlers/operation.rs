//! Mutating handlers (deposit, withdraw, transfer)
//!
//! Input is validated here and in the command constructors; nothing
//! malformed reaches the orchestrator. A business failure (insufficient
//! funds, unknown account) is `200 OK` with `data.status = "failed"`.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use rust_decimal::Decimal;

use super::super::state::AppState;
use super::super::types::{
    AmountRequest, ApiError, ApiResult, TransferRequest, idempotency_key, ok,
};
use crate::money::parse_amount;
use crate::orchestrator::{
    DepositCommand, DepositResult, TransferCommand, TransferResult, WithdrawCommand,
    WithdrawResult,
};

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(req)| req)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

fn amount(raw: &str) -> Result<Decimal, ApiError> {
    parse_amount(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

/// Deposit into an account
///
/// POST /v1/deposit
#[utoipa::path(
    post,
    path = "/v1/deposit",
    request_body(content = AmountRequest, content_type = "application/json"),
    params(
        ("Idempotency-Key" = String, Header, description = "UUID identifying this logical deposit")
    ),
    responses(
        (status = 200, description = "Deposit completed or failed", body = DepositResult, content_type = "application/json"),
        (status = 400, description = "Invalid parameters or missing Idempotency-Key"),
        (status = 503, description = "Coordination store unavailable"),
        (status = 504, description = "Timed out waiting for a concurrent duplicate")
    ),
    tag = "Operations"
)]
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> ApiResult<DepositResult> {
    let key = idempotency_key(&headers)?;
    let req = body(payload)?;
    tracing::info!(op = "deposit", transaction_id = %key, account_id = %req.id, "Request received");

    let cmd = DepositCommand::new(&req.id, amount(&req.amount)?, &key)?;
    ok(state.orchestrator.deposit(cmd).await?)
}

/// Withdraw from an account
///
/// POST /v1/withdraw
#[utoipa::path(
    post,
    path = "/v1/withdraw",
    request_body(content = AmountRequest, content_type = "application/json"),
    params(
        ("Idempotency-Key" = String, Header, description = "UUID identifying this logical withdrawal")
    ),
    responses(
        (status = 200, description = "Withdrawal completed or failed", body = WithdrawResult, content_type = "application/json"),
        (status = 400, description = "Invalid parameters or missing Idempotency-Key"),
        (status = 503, description = "Coordination store unavailable"),
        (status = 504, description = "Timed out waiting for a concurrent duplicate")
    ),
    tag = "Operations"
)]
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> ApiResult<WithdrawResult> {
    let key = idempotency_key(&headers)?;
    let req = body(payload)?;
    tracing::info!(op = "withdraw", transaction_id = %key, account_id = %req.id, "Request received");

    let cmd = WithdrawCommand::new(&req.id, amount(&req.amount)?, &key)?;
    ok(state.orchestrator.withdraw(cmd).await?)
}

/// Transfer between two accounts
///
/// POST /v1/transfer
#[utoipa::path(
    post,
    path = "/v1/transfer",
    request_body(content = TransferRequest, content_type = "application/json"),
    params(
        ("Idempotency-Key" = String, Header, description = "UUID identifying this logical transfer")
    ),
    responses(
        (status = 200, description = "Transfer completed or failed", body = TransferResult, content_type = "application/json"),
        (status = 400, description = "Invalid parameters or missing Idempotency-Key"),
        (status = 503, description = "Coordination store unavailable"),
        (status = 504, description = "Timed out waiting for a concurrent duplicate")
    ),
    tag = "Operations"
)]
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<TransferResult> {
    let key = idempotency_key(&headers)?;
    let req = body(payload)?;
    tracing::info!(
        op = "transfer",
        transaction_id = %key,
        from = %req.from,
        to = %req.to,
        "Request received"
    );

    let cmd = TransferCommand::new(&req.from, &req.to, amount(&req.amount)?, &key)?;
    ok(state.orchestrator.transfer(cmd).await?)
}
