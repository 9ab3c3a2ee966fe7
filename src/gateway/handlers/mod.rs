//! HTTP handlers
//!
//! - [`account`]: account creation, balance, history (read path)
//! - [`operation`]: deposit / withdraw / transfer through the orchestrator
//! - [`health`]: dependency probe

pub mod account;
pub mod health;
pub mod operation;

pub use account::{create_account, get_account, list_transactions};
pub use health::{HealthResponse, health_check};
pub use operation::{deposit, transfer, withdraw};

use super::types::ApiError;
use crate::orchestrator::types::canonical_uuid;

/// Account ids in paths are UUIDs
pub(crate) fn parse_account_id(raw: &str) -> Result<String, ApiError> {
    canonical_uuid(raw)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid account id: {}", raw)))
}
