//! Gateway request / response types
//!
//! - `ApiResponse<T>`: unified `{code, msg, data}` envelope
//! - `ApiError` / `ApiResult`: handler error path, built from `WalletError`
//! - Request DTOs and `Idempotency-Key` extraction

use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::WalletError;

/// Header carrying the caller's idempotency key
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: payload on success, absent on error
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = 0)]
    pub code: i32,
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Handler return type
pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// 200 OK with data
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

/// 201 Created with data
pub fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

// ============================================================================
// Errors
// ============================================================================

/// Error half of [`ApiResult`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error_codes::ACCOUNT_NOT_FOUND, msg)
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }
}

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.api_code(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.code, self.msg))).into_response()
    }
}

/// Standard API error codes
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const MISSING_IDEMPOTENCY_KEY: i32 = 1002;

    // Resource errors (4xxx)
    pub const ACCOUNT_NOT_FOUND: i32 = 4004;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5003;
    pub const RESULT_TIMEOUT: i32 = 5004;
}

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /v1/deposit` and `POST /v1/withdraw`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AmountRequest {
    /// Account id (UUID)
    #[schema(example = "8f14e45f-ceea-467f-a0e6-1f4c2d5b7e10")]
    pub id: String,
    /// Positive amount, at most 2 decimals
    #[schema(example = "50.00")]
    pub amount: String,
}

/// Body of `POST /v1/transfer`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransferRequest {
    #[schema(example = "8f14e45f-ceea-467f-a0e6-1f4c2d5b7e10")]
    pub from: String,
    #[schema(example = "c9f0f895-fb98-4b91-b2b9-6a5f0e3d2a11")]
    pub to: String,
    #[schema(example = "30.00")]
    pub amount: String,
}

/// Read the `Idempotency-Key` header
pub fn idempotency_key(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                error_codes::MISSING_IDEMPOTENCY_KEY,
                "Missing Idempotency-Key header",
            )
        })?
        .to_str()
        .map_err(|_| ApiError::bad_request("Idempotency-Key must be ASCII"))?
        .trim();

    if value.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            error_codes::MISSING_IDEMPOTENCY_KEY,
            "Missing Idempotency-Key header",
        ));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_success_envelope() {
        let json = serde_json::to_value(ApiResponse::success(42)).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["msg"], "ok");
        assert_eq!(json["data"], 42);
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let json = serde_json::to_value(ApiResponse::<()>::error(1001, "bad")).unwrap();
        assert_eq!(json["code"], 1001);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_wallet_error_mapping() {
        let e = ApiError::from(WalletError::Timeout("k_Deposit".into()));
        assert_eq!(e.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(e.code, error_codes::RESULT_TIMEOUT);

        let e = ApiError::from(WalletError::Validation("amount".into()));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, error_codes::INVALID_PARAMETER);

        let e = ApiError::from(WalletError::Coordination("redis".into()));
        assert_eq!(e.code, error_codes::SERVICE_UNAVAILABLE);

        let e = ApiError::from(WalletError::Storage("pg".into()));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.code, error_codes::INTERNAL_ERROR);
    }

    #[test]
    fn test_idempotency_key_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            idempotency_key(&headers).unwrap_err().code,
            error_codes::MISSING_IDEMPOTENCY_KEY
        );

        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static(" abc "));
        assert_eq!(idempotency_key(&headers).unwrap(), "abc");
    }
}
