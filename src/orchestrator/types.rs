//! Orchestrator Types
//!
//! Validated commands going in, tagged results coming out. A command that
//! exists has already passed every input check, so the orchestrator never
//! touches the coordination store with malformed input.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{WalletError, WalletResult};
use crate::ledger::{LedgerTransaction, TxnStatus, TxnType};
use crate::money::{serde_amount, validate_amount};

// ============================================================================
// Operation
// ============================================================================

/// Mutating operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Operation {
    Deposit,
    Withdraw,
    Transfer,
}

impl Operation {
    /// Name used in lease keys (`{key}_Deposit`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Deposit => "Deposit",
            Operation::Withdraw => "Withdraw",
            Operation::Transfer => "Transfer",
        }
    }

    /// Ledger record types this operation writes
    pub fn record_types(&self) -> &'static [TxnType] {
        match self {
            Operation::Deposit => &[TxnType::Deposit],
            Operation::Withdraw => &[TxnType::Withdraw],
            Operation::Transfer => &[TxnType::Sender, TxnType::Receiver],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Status
// ============================================================================

/// Terminal outcome reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Completed,
    Failed,
}

impl From<TxnStatus> for OperationStatus {
    fn from(s: TxnStatus) -> Self {
        match s {
            TxnStatus::Completed => OperationStatus::Completed,
            TxnStatus::Failed => OperationStatus::Failed,
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Lowercase hyphenated form; ids are stored and compared as text
pub(crate) fn canonical_uuid(value: &str) -> Option<String> {
    Uuid::parse_str(value)
        .ok()
        .map(|id| id.hyphenated().to_string())
}

fn require_uuid(field: &str, value: &str) -> WalletResult<String> {
    canonical_uuid(value)
        .ok_or_else(|| WalletError::Validation(format!("{} must be a UUID: {:?}", field, value)))
}

/// Validated deposit request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositCommand {
    account_id: String,
    amount: Decimal,
    idempotency_key: String,
}

impl DepositCommand {
    pub fn new(account_id: &str, amount: Decimal, idempotency_key: &str) -> WalletResult<Self> {
        Ok(Self {
            account_id: require_uuid("id", account_id)?,
            amount: validate_amount(amount)?,
            idempotency_key: require_uuid("Idempotency-Key", idempotency_key)?,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }
}

/// Validated withdraw request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawCommand {
    account_id: String,
    amount: Decimal,
    idempotency_key: String,
}

impl WithdrawCommand {
    pub fn new(account_id: &str, amount: Decimal, idempotency_key: &str) -> WalletResult<Self> {
        Ok(Self {
            account_id: require_uuid("id", account_id)?,
            amount: validate_amount(amount)?,
            idempotency_key: require_uuid("Idempotency-Key", idempotency_key)?,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }
}

/// Validated transfer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    from: String,
    to: String,
    amount: Decimal,
    idempotency_key: String,
}

impl TransferCommand {
    pub fn new(from: &str, to: &str, amount: Decimal, idempotency_key: &str) -> WalletResult<Self> {
        let from = require_uuid("from", from)?;
        let to = require_uuid("to", to)?;
        if from == to {
            return Err(WalletError::Validation(
                "from and to must be different accounts".to_string(),
            ));
        }

        Ok(Self {
            from,
            to,
            amount: validate_amount(amount)?,
            idempotency_key: require_uuid("Idempotency-Key", idempotency_key)?,
        })
    }

    pub fn from_account(&self) -> &str {
        &self.from
    }

    pub fn to_account(&self) -> &str {
        &self.to
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DepositResult {
    pub account_id: String,
    #[serde(with = "serde_amount")]
    #[schema(value_type = String, example = "50.00")]
    pub amount: Decimal,
    pub status: OperationStatus,
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WithdrawResult {
    pub account_id: String,
    #[serde(with = "serde_amount")]
    #[schema(value_type = String, example = "50.00")]
    pub amount: Decimal,
    pub status: OperationStatus,
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransferResult {
    pub from: String,
    pub to: String,
    #[serde(with = "serde_amount")]
    #[schema(value_type = String, example = "30.00")]
    pub amount: Decimal,
    pub status: OperationStatus,
    pub transaction_id: String,
}

/// Broadcast payload: one variant per operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum OperationResult {
    Deposit(DepositResult),
    Withdraw(WithdrawResult),
    Transfer(TransferResult),
}

impl OperationResult {
    pub fn operation(&self) -> Operation {
        match self {
            OperationResult::Deposit(_) => Operation::Deposit,
            OperationResult::Withdraw(_) => Operation::Withdraw,
            OperationResult::Transfer(_) => Operation::Transfer,
        }
    }

    pub fn status(&self) -> OperationStatus {
        match self {
            OperationResult::Deposit(r) => r.status,
            OperationResult::Withdraw(r) => r.status,
            OperationResult::Transfer(r) => r.status,
        }
    }
}

// === Rebuild from stored records (replay) ===

impl DepositResult {
    pub(crate) fn from_record(record: &LedgerTransaction) -> Self {
        Self {
            account_id: record.account_id.clone(),
            amount: record.amount,
            status: record.status.into(),
            transaction_id: record.transaction_id.clone(),
        }
    }
}

impl WithdrawResult {
    pub(crate) fn from_record(record: &LedgerTransaction) -> Self {
        Self {
            account_id: record.account_id.clone(),
            amount: record.amount,
            status: record.status.into(),
            transaction_id: record.transaction_id.clone(),
        }
    }
}

impl TransferResult {
    /// Rebuild from the transfer legs; the sender leg carries both parties
    pub(crate) fn from_records(records: &[LedgerTransaction]) -> Option<Self> {
        let leg = records
            .iter()
            .find(|r| r.txn_type == TxnType::Sender)
            .or_else(|| records.first())?;

        // Any failed leg means the transfer failed as a whole
        let status = if records.iter().all(|r| r.status == TxnStatus::Completed) {
            OperationStatus::Completed
        } else {
            OperationStatus::Failed
        };

        Some(Self {
            from: leg.sender_id.clone(),
            to: leg.receiver_id.clone(),
            amount: leg.amount,
            status,
            transaction_id: leg.transaction_id.clone(),
        })
    }
}
