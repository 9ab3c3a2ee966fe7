//! In-Memory Ledger
//!
//! Single-process ledger used by `storage_backend: memory` and by tests.
//! One mutex guards balances and the log together, which makes every
//! operation atomic in the same sense as the Postgres statements.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::types::{Account, LedgerOutcome, LedgerTransaction, TxnStatus, TxnType};
use super::{LedgerStore, ledger_record};
use crate::error::{WalletError, WalletResult};

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, Decimal>,
    log: Vec<LedgerTransaction>,
}

impl LedgerState {
    /// Append with the same uniqueness rule as the `transactions` primary key
    fn append(&mut self, record: LedgerTransaction) -> WalletResult<()> {
        if self.log.iter().any(|r| {
            r.transaction_id == record.transaction_id && r.txn_type == record.txn_type
        }) {
            return Err(WalletError::Storage(format!(
                "duplicate ledger record ({}, {})",
                record.transaction_id, record.txn_type
            )));
        }
        self.log.push(record);
        Ok(())
    }

    fn credit(&mut self, account_id: &str, amount: Decimal) -> u64 {
        match self.balances.get_mut(account_id) {
            Some(balance) => {
                *balance += amount;
                1
            }
            None => 0,
        }
    }

    fn debit(&mut self, account_id: &str, amount: Decimal) -> u64 {
        match self.balances.get_mut(account_id) {
            Some(balance) if *balance >= amount => {
                *balance -= amount;
                1
            }
            _ => 0,
        }
    }
}

/// In-memory ledger
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    /// Number of mutation calls (deposit/withdraw/transfer) received
    mutation_count: AtomicUsize,
    /// When set, mutations fail with a storage error and change nothing
    fail_mutations: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account with an explicit id and balance
    pub fn insert_account(&self, account_id: &str, balance: Decimal) {
        let mut state = self.lock();
        state
            .balances
            .insert(account_id.to_string(), crate::money::normalize_amount(balance));
    }

    /// Current balance, `None` if the account does not exist
    pub fn balance(&self, account_id: &str) -> Option<Decimal> {
        self.lock().balances.get(account_id).copied()
    }

    /// Number of mutation invocations so far
    pub fn mutation_count(&self) -> usize {
        self.mutation_count.load(Ordering::SeqCst)
    }

    /// Total number of log records
    pub fn record_count(&self) -> usize {
        self.lock().log.len()
    }

    /// Simulate storage connectivity loss
    pub fn set_fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // A poisoned lock only means a test panicked mid-operation
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin_mutation(&self) -> WalletResult<()> {
        self.mutation_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(WalletError::Storage(
                "simulated storage failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn deposit(
        &self,
        account_id: &str,
        amount: Decimal,
        txn_id: &str,
    ) -> WalletResult<LedgerOutcome> {
        self.begin_mutation()?;
        let mut state = self.lock();

        let status = TxnStatus::from_rows_affected(state.credit(account_id, amount));
        let record = ledger_record(txn_id, account_id, amount, TxnType::Deposit, "", status);
        if let Err(e) = state.append(record.clone()) {
            if status == TxnStatus::Completed {
                state.debit(account_id, amount);
            }
            return Err(e);
        }

        Ok(LedgerOutcome::new(status, vec![record]))
    }

    async fn withdraw(
        &self,
        account_id: &str,
        amount: Decimal,
        txn_id: &str,
    ) -> WalletResult<LedgerOutcome> {
        self.begin_mutation()?;
        let mut state = self.lock();

        let status = TxnStatus::from_rows_affected(state.debit(account_id, amount));
        let record = ledger_record(txn_id, account_id, amount, TxnType::Withdraw, "", status);
        if let Err(e) = state.append(record.clone()) {
            if status == TxnStatus::Completed {
                state.credit(account_id, amount);
            }
            return Err(e);
        }

        Ok(LedgerOutcome::new(status, vec![record]))
    }

    async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        txn_id: &str,
    ) -> WalletResult<LedgerOutcome> {
        self.begin_mutation()?;
        let mut state = self.lock();

        let already_logged = |state: &LedgerState, t: TxnType| {
            state
                .log
                .iter()
                .any(|r| r.transaction_id == txn_id && r.txn_type == t)
        };
        if already_logged(&state, TxnType::Sender) || already_logged(&state, TxnType::Receiver) {
            return Err(WalletError::Storage(format!(
                "duplicate ledger record ({}, transfer)",
                txn_id
            )));
        }

        if state.debit(from, amount) == 0 {
            let sender = ledger_record(txn_id, from, amount, TxnType::Sender, to, TxnStatus::Failed);
            state.append(sender.clone())?;
            return Ok(LedgerOutcome::new(TxnStatus::Failed, vec![sender]));
        }

        if state.credit(to, amount) == 0 {
            // Roll the debit back, record both legs failed
            state.credit(from, amount);
            let sender = ledger_record(txn_id, from, amount, TxnType::Sender, to, TxnStatus::Failed);
            let receiver =
                ledger_record(txn_id, to, amount, TxnType::Receiver, from, TxnStatus::Failed);
            state.append(sender.clone())?;
            state.append(receiver.clone())?;
            return Ok(LedgerOutcome::new(TxnStatus::Failed, vec![sender, receiver]));
        }

        let sender = ledger_record(txn_id, from, amount, TxnType::Sender, to, TxnStatus::Completed);
        let receiver =
            ledger_record(txn_id, to, amount, TxnType::Receiver, from, TxnStatus::Completed);
        state.append(sender.clone())?;
        state.append(receiver.clone())?;

        Ok(LedgerOutcome::new(
            TxnStatus::Completed,
            vec![sender, receiver],
        ))
    }

    async fn find_by_transaction_id(&self, txn_id: &str) -> WalletResult<Vec<LedgerTransaction>> {
        Ok(self
            .lock()
            .log
            .iter()
            .filter(|r| r.transaction_id == txn_id)
            .cloned()
            .collect())
    }

    async fn create_account(&self) -> WalletResult<Account> {
        let id = uuid::Uuid::new_v4().to_string();
        let balance = crate::money::normalize_amount(Decimal::ZERO);
        self.lock().balances.insert(id.clone(), balance);
        Ok(Account { id, balance })
    }

    async fn get_account(&self, account_id: &str) -> WalletResult<Option<Account>> {
        Ok(self.balance(account_id).map(|balance| Account {
            id: account_id.to_string(),
            balance,
        }))
    }

    async fn list_transactions(&self, account_id: &str) -> WalletResult<Vec<LedgerTransaction>> {
        Ok(self
            .lock()
            .log
            .iter()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> WalletResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ledger_with(accounts: &[(&str, &str)]) -> MemoryLedger {
        let ledger = MemoryLedger::new();
        for (id, balance) in accounts {
            ledger.insert_account(id, dec(balance));
        }
        ledger
    }

    #[tokio::test]
    async fn test_deposit_completed() {
        let ledger = ledger_with(&[("a", "100.00")]);
        let out = ledger.deposit("a", dec("50.00"), "k1").await.unwrap();

        assert!(out.is_completed());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].txn_type, TxnType::Deposit);
        assert_eq!(ledger.balance("a"), Some(dec("150.00")));
    }

    #[tokio::test]
    async fn test_deposit_unknown_account_records_failed() {
        let ledger = MemoryLedger::new();
        let out = ledger.deposit("ghost", dec("50.00"), "k1").await.unwrap();

        assert_eq!(out.status, TxnStatus::Failed);
        let stored = ledger.find_by_transaction_id("k1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, TxnStatus::Failed);
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_funds_leaves_balance() {
        let ledger = ledger_with(&[("a", "100.00")]);
        let out = ledger.withdraw("a", dec("150.00"), "k1").await.unwrap();

        assert_eq!(out.status, TxnStatus::Failed);
        assert_eq!(ledger.balance("a"), Some(dec("100.00")));
    }

    #[tokio::test]
    async fn test_withdraw_exact_balance_reaches_zero() {
        let ledger = ledger_with(&[("a", "100.00")]);
        let out = ledger.withdraw("a", dec("100.00"), "k1").await.unwrap();

        assert!(out.is_completed());
        assert_eq!(ledger.balance("a"), Some(dec("0.00")));
    }

    #[tokio::test]
    async fn test_transfer_happy_path() {
        let ledger = ledger_with(&[("a", "100.00"), ("b", "0.00")]);
        let out = ledger.transfer("a", "b", dec("30.00"), "k3").await.unwrap();

        assert!(out.is_completed());
        assert_eq!(ledger.balance("a"), Some(dec("70.00")));
        assert_eq!(ledger.balance("b"), Some(dec("30.00")));

        let legs = ledger.find_by_transaction_id("k3").await.unwrap();
        assert_eq!(legs.len(), 2);
        assert!(legs.iter().all(|l| l.amount == dec("30.00")));
        assert_eq!(legs[0].txn_type, TxnType::Sender);
        assert_eq!(legs[1].txn_type, TxnType::Receiver);
    }

    #[tokio::test]
    async fn test_transfer_insufficient_funds_single_failed_leg() {
        let ledger = ledger_with(&[("a", "10.00"), ("b", "0.00")]);
        let out = ledger.transfer("a", "b", dec("30.00"), "k").await.unwrap();

        assert_eq!(out.status, TxnStatus::Failed);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].txn_type, TxnType::Sender);
        assert_eq!(ledger.balance("a"), Some(dec("10.00")));
        assert_eq!(ledger.balance("b"), Some(dec("0.00")));
    }

    #[tokio::test]
    async fn test_transfer_missing_destination_rolls_back() {
        let ledger = ledger_with(&[("a", "100.00")]);
        let out = ledger.transfer("a", "ghost", dec("30.00"), "k").await.unwrap();

        assert_eq!(out.status, TxnStatus::Failed);
        assert_eq!(out.records.len(), 2);
        assert!(out.records.iter().all(|r| r.status == TxnStatus::Failed));
        assert_eq!(ledger.balance("a"), Some(dec("100.00")));
    }

    #[tokio::test]
    async fn test_duplicate_record_rejected_without_effect() {
        let ledger = ledger_with(&[("a", "100.00")]);
        ledger.deposit("a", dec("10.00"), "k").await.unwrap();

        let err = ledger.deposit("a", dec("10.00"), "k").await.unwrap_err();
        assert!(matches!(err, WalletError::Storage(_)));
        assert_eq!(ledger.balance("a"), Some(dec("110.00")));
        assert_eq!(ledger.record_count(), 1);
    }

    #[tokio::test]
    async fn test_simulated_failure_changes_nothing() {
        let ledger = ledger_with(&[("a", "100.00")]);
        ledger.set_fail_mutations(true);

        let err = ledger.withdraw("a", dec("10.00"), "k").await.unwrap_err();
        assert!(matches!(err, WalletError::Storage(_)));
        assert_eq!(ledger.balance("a"), Some(dec("100.00")));
        assert_eq!(ledger.record_count(), 0);
        assert_eq!(ledger.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let ledger = MemoryLedger::new();
        let acc = ledger.create_account().await.unwrap();
        assert_eq!(acc.balance, dec("0.00"));

        ledger.deposit(&acc.id, dec("5.00"), "k1").await.unwrap();
        ledger.withdraw(&acc.id, dec("2.00"), "k2").await.unwrap();

        let history = ledger.list_transactions(&acc.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].transaction_id, "k1");
        assert_eq!(
            ledger.get_account(&acc.id).await.unwrap().unwrap().balance,
            dec("3.00")
        );
    }
}
