//! Ledger Core Types
//!
//! Accounts, transaction log records and the outcome of one atomic ledger
//! statement. Enum string forms are what Postgres stores and what the API
//! returns.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::money::serde_amount;

/// Wallet account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    /// Stable external identifier (UUID string)
    #[schema(example = "8f14e45f-ceea-467f-a0e6-1f4c2d5b7e10")]
    pub id: String,
    /// Non-negative fixed-point balance
    #[serde(with = "serde_amount")]
    #[schema(value_type = String, example = "100.00")]
    pub balance: Decimal,
}

/// Kind of ledger record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxnType {
    Deposit,
    Withdraw,
    /// Debit leg of a transfer
    Sender,
    /// Credit leg of a transfer
    Receiver,
}

impl TxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnType::Deposit => "deposit",
            TxnType::Withdraw => "withdraw",
            TxnType::Sender => "sender",
            TxnType::Receiver => "receiver",
        }
    }
}

impl fmt::Display for TxnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TxnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TxnType::Deposit),
            "withdraw" => Ok(TxnType::Withdraw),
            "sender" => Ok(TxnType::Sender),
            "receiver" => Ok(TxnType::Receiver),
            other => Err(format!("Invalid txn_type: {}", other)),
        }
    }
}

/// Terminal status of a ledger record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TxnStatus {
    Completed,
    Failed,
}

impl TxnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnStatus::Completed => "completed",
            TxnStatus::Failed => "failed",
        }
    }

    /// Status derived from the rows-affected count of the balance update
    #[inline]
    pub fn from_rows_affected(rows: u64) -> Self {
        if rows > 0 {
            TxnStatus::Completed
        } else {
            TxnStatus::Failed
        }
    }
}

impl fmt::Display for TxnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TxnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(TxnStatus::Completed),
            "failed" => Ok(TxnStatus::Failed),
            other => Err(format!("Invalid status: {}", other)),
        }
    }
}

/// One row of the transaction log
///
/// `transaction_id` is the caller's idempotency key. Transfers write two rows
/// sharing it (sender + receiver leg).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LedgerTransaction {
    pub transaction_id: String,
    pub account_id: String,
    #[serde(with = "serde_amount")]
    #[schema(value_type = String, example = "50.00")]
    pub amount: Decimal,
    pub txn_type: TxnType,
    /// Empty for non-transfer records
    pub sender_id: String,
    /// Empty for non-transfer records
    pub receiver_id: String,
    pub status: TxnStatus,
    pub timestamp: DateTime<Utc>,
}

/// Result of one atomic ledger operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub status: TxnStatus,
    /// Records written by the operation, in write order
    pub records: Vec<LedgerTransaction>,
}

impl LedgerOutcome {
    pub fn new(status: TxnStatus, records: Vec<LedgerTransaction>) -> Self {
        Self { status, records }
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == TxnStatus::Completed
    }
}
