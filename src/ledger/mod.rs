//! Account Ledger
//!
//! Owns balances and the transaction log. Every mutation is ONE atomic
//! storage-level step: the conditional balance update and the log append
//! either both happen or neither does.
//!
//! # Operations
//!
//! ```text
//! deposit   balance += amount                     -> deposit  record
//! withdraw  balance -= amount  IF balance>=amount -> withdraw record
//! transfer  withdraw-leg, then deposit-leg        -> sender + receiver records
//! ```
//!
//! A zero-rows-affected update is a business outcome, not an error: the
//! record is written with status `failed` and the call returns `Ok`.
//!
//! # Transfer partial failure
//!
//! Debit succeeds but the credit hits no row (unknown destination): the
//! storage transaction is rolled back and both legs are recorded as `failed`.
//! The source balance is never left debited.

pub mod lookup;
pub mod memory;
pub mod postgres;
pub mod types;

pub use lookup::TransactionLookup;
pub use memory::MemoryLedger;
pub use postgres::PgLedger;
pub use types::{Account, LedgerOutcome, LedgerTransaction, TxnStatus, TxnType};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::WalletResult;

/// Ledger storage backend
///
/// Implementations MUST make each mutation atomic and derive success from
/// the mutation's own rows-affected count, never from a prior existence check.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Credit `amount` to `account_id`
    async fn deposit(
        &self,
        account_id: &str,
        amount: Decimal,
        txn_id: &str,
    ) -> WalletResult<LedgerOutcome>;

    /// Debit `amount` from `account_id` only if the balance covers it
    async fn withdraw(
        &self,
        account_id: &str,
        amount: Decimal,
        txn_id: &str,
    ) -> WalletResult<LedgerOutcome>;

    /// Move `amount` from `from` to `to`
    async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        txn_id: &str,
    ) -> WalletResult<LedgerOutcome>;

    /// All records written under `txn_id` (empty when none)
    async fn find_by_transaction_id(&self, txn_id: &str) -> WalletResult<Vec<LedgerTransaction>>;

    /// Open a new account with a zero balance
    async fn create_account(&self) -> WalletResult<Account>;

    /// Current balance of an account
    async fn get_account(&self, account_id: &str) -> WalletResult<Option<Account>>;

    /// Full history of an account, oldest first
    async fn list_transactions(&self, account_id: &str) -> WalletResult<Vec<LedgerTransaction>>;

    /// Cheap reachability probe
    async fn health_check(&self) -> WalletResult<()>;
}

/// Build the log record for one ledger step
pub(crate) fn ledger_record(
    txn_id: &str,
    account_id: &str,
    amount: Decimal,
    txn_type: TxnType,
    counterparty: &str,
    status: TxnStatus,
) -> LedgerTransaction {
    let (sender_id, receiver_id) = match txn_type {
        TxnType::Sender => (account_id.to_string(), counterparty.to_string()),
        TxnType::Receiver => (counterparty.to_string(), account_id.to_string()),
        TxnType::Deposit | TxnType::Withdraw => (String::new(), String::new()),
    };

    LedgerTransaction {
        transaction_id: txn_id.to_string(),
        account_id: account_id.to_string(),
        amount,
        txn_type,
        sender_id,
        receiver_id,
        status,
        timestamp: chrono::Utc::now(),
    }
}
