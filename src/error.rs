//! Wallet Error Types
//!
//! One taxonomy shared by the ledger, the idempotency coordinator and the
//! orchestrator. Business outcomes (insufficient funds, unknown account on a
//! mutation) are NOT errors: they come back as `OperationStatus::Failed`.

use thiserror::Error;

/// Wallet error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    // === Rejected before any coordination or ledger state is touched ===
    #[error("Invalid request: {0}")]
    Validation(String),

    // === Coordination backend (lease store / broadcast channel) ===
    #[error("Coordination store unavailable: {0}")]
    Coordination(String),

    #[error("Timed out waiting for result: {0}")]
    Timeout(String),

    #[error("Result subscription failed: {0}")]
    Subscription(String),

    // === Storage backend ===
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // === Read path ===
    #[error("Account not found: {0}")]
    AccountNotFound(String),
}

pub type WalletResult<T> = Result<T, WalletError>;

impl WalletError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::Validation(_) => "INVALID_PARAMETER",
            WalletError::Coordination(_) => "COORDINATION_UNAVAILABLE",
            WalletError::Timeout(_) => "RESULT_TIMEOUT",
            WalletError::Subscription(_) => "SUBSCRIPTION_FAILED",
            WalletError::Storage(_) => "STORAGE_ERROR",
            WalletError::Serialization(_) => "SERIALIZATION_ERROR",
            WalletError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
        }
    }

    /// Numeric code carried in the JSON envelope
    pub fn api_code(&self) -> i32 {
        match self {
            WalletError::Validation(_) => 1001,
            WalletError::AccountNotFound(_) => 4004,
            WalletError::Timeout(_) => 5004,
            WalletError::Coordination(_) | WalletError::Subscription(_) => 5003,
            WalletError::Storage(_) | WalletError::Serialization(_) => 5000,
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            WalletError::Validation(_) => 400,
            WalletError::AccountNotFound(_) => 404,
            WalletError::Timeout(_) => 504,
            WalletError::Coordination(_) | WalletError::Subscription(_) => 503,
            WalletError::Storage(_) | WalletError::Serialization(_) => 500,
        }
    }

    /// Whether the caller may safely retry with the same idempotency key
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            WalletError::Validation(_) | WalletError::AccountNotFound(_)
        )
    }
}

impl From<sqlx::Error> for WalletError {
    fn from(e: sqlx::Error) -> Self {
        WalletError::Storage(e.to_string())
    }
}

impl From<redis::RedisError> for WalletError {
    fn from(e: redis::RedisError) -> Self {
        WalletError::Coordination(e.to_string())
    }
}

impl From<deadpool_redis::PoolError> for WalletError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        WalletError::Coordination(e.to_string())
    }
}

impl From<crate::money::MoneyError> for WalletError {
    fn from(e: crate::money::MoneyError) -> Self {
        WalletError::Validation(e.to_string())
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::Serialization(e.to_string())
    }
}
