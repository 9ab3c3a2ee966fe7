//! Operation Orchestrator
//!
//! Drives one deposit / withdraw / transfer through the idempotency
//! protocol:
//!
//! ```text
//! acquire {key}_{Op}
//!   ├─ contended ─> await broadcast (bounded) ─> return it verbatim
//!   └─ held ─────> lookup(key)
//!                    ├─ found ──> replay stored outcome
//!                    └─ absent ─> ledger mutation
//!                  publish ─> release ─> return
//! ```
//!
//! Storage errors skip the publish: the lease is released and the caller
//! retries with the same key.

pub mod types;

pub use types::{
    DepositCommand, DepositResult, Operation, OperationResult, OperationStatus, TransferCommand,
    TransferResult, WithdrawCommand, WithdrawResult,
};

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::IdempotencyConfig;
use crate::coordination::{IdempotencyCoordinator, lease_key};
use crate::error::{WalletError, WalletResult};
use crate::ledger::{LedgerStore, LedgerTransaction, TransactionLookup};

/// Orchestrator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// How long a contended request waits for the holder's broadcast
    pub wait_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&IdempotencyConfig> for OrchestratorConfig {
    fn from(c: &IdempotencyConfig) -> Self {
        Self {
            wait_timeout: Duration::from_millis(c.wait_timeout_ms),
        }
    }
}

/// Borrowed view over the three command kinds
#[derive(Debug, Clone, Copy)]
enum Command<'a> {
    Deposit(&'a DepositCommand),
    Withdraw(&'a WithdrawCommand),
    Transfer(&'a TransferCommand),
}

impl Command<'_> {
    fn operation(&self) -> Operation {
        match self {
            Command::Deposit(_) => Operation::Deposit,
            Command::Withdraw(_) => Operation::Withdraw,
            Command::Transfer(_) => Operation::Transfer,
        }
    }

    fn idempotency_key(&self) -> &str {
        match self {
            Command::Deposit(c) => c.idempotency_key(),
            Command::Withdraw(c) => c.idempotency_key(),
            Command::Transfer(c) => c.idempotency_key(),
        }
    }
}

/// Operation orchestrator
pub struct OperationOrchestrator {
    coordinator: IdempotencyCoordinator,
    ledger: Arc<dyn LedgerStore>,
    lookup: TransactionLookup,
    config: OrchestratorConfig,
}

impl OperationOrchestrator {
    pub fn new(
        coordinator: IdempotencyCoordinator,
        ledger: Arc<dyn LedgerStore>,
        lookup: TransactionLookup,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            coordinator,
            ledger,
            lookup,
            config,
        }
    }

    pub fn coordinator(&self) -> &IdempotencyCoordinator {
        &self.coordinator
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    pub async fn deposit(&self, cmd: DepositCommand) -> WalletResult<DepositResult> {
        match self.execute(Command::Deposit(&cmd)).await? {
            OperationResult::Deposit(r) => Ok(r),
            other => Err(unexpected_result(Operation::Deposit, &other)),
        }
    }

    pub async fn withdraw(&self, cmd: WithdrawCommand) -> WalletResult<WithdrawResult> {
        match self.execute(Command::Withdraw(&cmd)).await? {
            OperationResult::Withdraw(r) => Ok(r),
            other => Err(unexpected_result(Operation::Withdraw, &other)),
        }
    }

    pub async fn transfer(&self, cmd: TransferCommand) -> WalletResult<TransferResult> {
        match self.execute(Command::Transfer(&cmd)).await? {
            OperationResult::Transfer(r) => Ok(r),
            other => Err(unexpected_result(Operation::Transfer, &other)),
        }
    }

    async fn execute(&self, command: Command<'_>) -> WalletResult<OperationResult> {
        let operation = command.operation();
        let key = lease_key(command.idempotency_key(), operation);

        let guard = self.coordinator.acquire(&key).await?;
        if !guard.is_held() {
            info!(op = %operation, lease_key = %key, "Duplicate in flight, waiting for result");
            return self
                .coordinator
                .await_result(&key, self.config.wait_timeout)
                .await;
        }

        let result = match self.run_once(command).await {
            Ok(result) => result,
            Err(e) => {
                error!(op = %operation, lease_key = %key, error = %e, "Operation failed");
                self.coordinator.release(guard).await;
                return Err(e);
            }
        };

        let published = self.coordinator.publish(&key, &result).await;
        self.coordinator.release(guard).await;

        if let Err(e) = published {
            // Outcome is durable; a retry replays it from the ledger
            error!(op = %operation, lease_key = %key, error = %e, "Failed to publish result");
            return Err(match e {
                WalletError::Coordination(_) => e,
                other => WalletError::Coordination(other.to_string()),
            });
        }

        info!(
            op = %operation,
            transaction_id = %command.idempotency_key(),
            status = ?result.status(),
            "Operation finished"
        );
        Ok(result)
    }

    /// Replay a stored outcome or run the mutation; caller holds the lease
    async fn run_once(&self, command: Command<'_>) -> WalletResult<OperationResult> {
        let operation = command.operation();
        let txn_id = command.idempotency_key();

        let existing = self.lookup.find_for(operation, txn_id).await?;
        if !existing.is_empty() {
            info!(op = %operation, transaction_id = %txn_id, "Replaying stored outcome");
            return replay(operation, &existing);
        }

        let result = match command {
            Command::Deposit(c) => {
                let outcome = self
                    .ledger
                    .deposit(c.account_id(), c.amount(), txn_id)
                    .await?;
                OperationResult::Deposit(DepositResult {
                    account_id: c.account_id().to_string(),
                    amount: c.amount(),
                    status: outcome.status.into(),
                    transaction_id: txn_id.to_string(),
                })
            }
            Command::Withdraw(c) => {
                let outcome = self
                    .ledger
                    .withdraw(c.account_id(), c.amount(), txn_id)
                    .await?;
                OperationResult::Withdraw(WithdrawResult {
                    account_id: c.account_id().to_string(),
                    amount: c.amount(),
                    status: outcome.status.into(),
                    transaction_id: txn_id.to_string(),
                })
            }
            Command::Transfer(c) => {
                let outcome = self
                    .ledger
                    .transfer(c.from_account(), c.to_account(), c.amount(), txn_id)
                    .await?;
                OperationResult::Transfer(TransferResult {
                    from: c.from_account().to_string(),
                    to: c.to_account().to_string(),
                    amount: c.amount(),
                    status: outcome.status.into(),
                    transaction_id: txn_id.to_string(),
                })
            }
        };

        if result.status() == OperationStatus::Failed {
            warn!(op = %operation, transaction_id = %txn_id, "Operation recorded as failed");
        }
        Ok(result)
    }
}

fn replay(operation: Operation, records: &[LedgerTransaction]) -> WalletResult<OperationResult> {
    let first = records
        .first()
        .ok_or_else(|| WalletError::Storage("replay with no records".to_string()))?;

    match operation {
        Operation::Deposit => Ok(OperationResult::Deposit(DepositResult::from_record(first))),
        Operation::Withdraw => Ok(OperationResult::Withdraw(WithdrawResult::from_record(first))),
        Operation::Transfer => TransferResult::from_records(records)
            .map(OperationResult::Transfer)
            .ok_or_else(|| WalletError::Storage("transfer legs missing".to_string())),
    }
}

fn unexpected_result(expected: Operation, got: &OperationResult) -> WalletError {
    WalletError::Serialization(format!(
        "expected {} result, got {}",
        expected,
        got.operation()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{LeaseSettings, MemoryCoordinationStore};
    use crate::ledger::MemoryLedger;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const A: &str = "8f14e45f-ceea-467f-a0e6-1f4c2d5b7e10";
    const B: &str = "c9f0f895-fb98-4b91-b2b9-6a5f0e3d2a11";

    struct Harness {
        orchestrator: Arc<OperationOrchestrator>,
        ledger: Arc<MemoryLedger>,
        store: Arc<MemoryCoordinationStore>,
    }

    fn harness(wait_timeout: Duration) -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::new(MemoryCoordinationStore::new());
        let coordinator = IdempotencyCoordinator::new(store.clone(), LeaseSettings::default());
        let orchestrator = OperationOrchestrator::new(
            coordinator,
            ledger.clone(),
            TransactionLookup::new(ledger.clone()),
            OrchestratorConfig { wait_timeout },
        );
        Harness {
            orchestrator: Arc::new(orchestrator),
            ledger,
            store,
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn key() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_funds() {
        let h = harness(Duration::from_secs(1));
        h.ledger.insert_account(A, dec("100.00"));

        let k1 = key();
        let result = h
            .orchestrator
            .withdraw(WithdrawCommand::new(A, dec("150.00"), &k1).unwrap())
            .await
            .unwrap();

        assert_eq!(result.status, OperationStatus::Failed);
        assert_eq!(result.transaction_id, k1);
        assert_eq!(h.ledger.balance(A), Some(dec("100.00")));
    }

    #[tokio::test]
    async fn test_deposit_retry_replays() {
        let h = harness(Duration::from_secs(1));
        h.ledger.insert_account(A, dec("100.00"));

        let k2 = key();
        let first = h
            .orchestrator
            .deposit(DepositCommand::new(A, dec("50.00"), &k2).unwrap())
            .await
            .unwrap();
        let retry = h
            .orchestrator
            .deposit(DepositCommand::new(A, dec("50.00"), &k2).unwrap())
            .await
            .unwrap();

        assert_eq!(first, retry);
        assert_eq!(first.status, OperationStatus::Completed);
        assert_eq!(first.amount, dec("50.00"));
        assert_eq!(h.ledger.balance(A), Some(dec("150.00")));
        assert_eq!(h.ledger.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_transfer_moves_funds() {
        let h = harness(Duration::from_secs(1));
        h.ledger.insert_account(A, dec("100.00"));
        h.ledger.insert_account(B, dec("0.00"));

        let k3 = key();
        let result = h
            .orchestrator
            .transfer(TransferCommand::new(A, B, dec("30.00"), &k3).unwrap())
            .await
            .unwrap();

        assert_eq!(result.status, OperationStatus::Completed);
        assert_eq!(h.ledger.balance(A), Some(dec("70.00")));
        assert_eq!(h.ledger.balance(B), Some(dec("30.00")));
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_mutate_once() {
        let h = harness(Duration::from_secs(5));
        h.ledger.insert_account(A, dec("100.00"));
        let k = key();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let orchestrator = h.orchestrator.clone();
            let cmd = DepositCommand::new(A, dec("10.00"), &k).unwrap();
            handles.push(tokio::spawn(async move { orchestrator.deposit(cmd).await }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(h.ledger.mutation_count(), 1);
        assert_eq!(h.ledger.balance(A), Some(dec("110.00")));
    }

    #[tokio::test]
    async fn test_same_key_different_operation_is_independent() {
        let h = harness(Duration::from_secs(1));
        h.ledger.insert_account(A, dec("100.00"));
        let k = key();

        h.orchestrator
            .deposit(DepositCommand::new(A, dec("10.00"), &k).unwrap())
            .await
            .unwrap();
        let withdraw = h
            .orchestrator
            .withdraw(WithdrawCommand::new(A, dec("10.00"), &k).unwrap())
            .await
            .unwrap();

        assert_eq!(withdraw.status, OperationStatus::Completed);
        assert_eq!(h.ledger.balance(A), Some(dec("100.00")));
    }

    #[tokio::test]
    async fn test_contended_request_times_out() {
        let h = harness(Duration::from_millis(50));
        h.ledger.insert_account(A, dec("100.00"));
        let k = key();

        // Someone else holds the lease and never publishes
        let foreign = h
            .orchestrator
            .coordinator()
            .acquire(&lease_key(&k, Operation::Deposit))
            .await
            .unwrap();
        assert!(foreign.is_held());

        let err = h
            .orchestrator
            .deposit(DepositCommand::new(A, dec("10.00"), &k).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Timeout(_)));
        assert!(err.is_retryable());
        assert_eq!(h.ledger.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_error_releases_lease_and_retry_succeeds() {
        let h = harness(Duration::from_secs(1));
        h.ledger.insert_account(A, dec("100.00"));
        let k = key();

        h.ledger.set_fail_mutations(true);
        let err = h
            .orchestrator
            .withdraw(WithdrawCommand::new(A, dec("40.00"), &k).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Storage(_)));
        assert!(!h.store.has_lease(&lease_key(&k, Operation::Withdraw)));

        h.ledger.set_fail_mutations(false);
        let result = h
            .orchestrator
            .withdraw(WithdrawCommand::new(A, dec("40.00"), &k).unwrap())
            .await
            .unwrap();
        assert_eq!(result.status, OperationStatus::Completed);
        assert_eq!(h.ledger.balance(A), Some(dec("60.00")));
    }

    #[tokio::test]
    async fn test_coordination_outage_touches_nothing() {
        let h = harness(Duration::from_secs(1));
        h.ledger.insert_account(A, dec("100.00"));
        h.store.set_unavailable(true);

        let err = h
            .orchestrator
            .deposit(DepositCommand::new(A, dec("10.00"), &key()).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Coordination(_)));
        assert_eq!(h.ledger.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_after_mutation_replays_on_retry() {
        let h = harness(Duration::from_secs(1));
        h.ledger.insert_account(A, dec("100.00"));
        let k = key();

        h.store.set_publish_unavailable(true);
        let err = h
            .orchestrator
            .deposit(DepositCommand::new(A, dec("10.00"), &k).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Coordination(_)));
        assert_eq!(h.ledger.mutation_count(), 1);
        assert_eq!(h.ledger.balance(A), Some(dec("110.00")));
        assert!(!h.store.has_lease(&lease_key(&k, Operation::Deposit)));

        h.store.set_publish_unavailable(false);
        let replayed = h
            .orchestrator
            .deposit(DepositCommand::new(A, dec("10.00"), &k).unwrap())
            .await
            .unwrap();
        assert_eq!(replayed.status, OperationStatus::Completed);
        assert_eq!(replayed.transaction_id, k);
        assert_eq!(h.ledger.mutation_count(), 1);
        assert_eq!(h.ledger.balance(A), Some(dec("110.00")));
    }

    #[tokio::test]
    async fn test_waiter_subscription_failure() {
        let h = harness(Duration::from_secs(1));
        h.ledger.insert_account(A, dec("100.00"));
        let k = key();

        let _holder = h
            .orchestrator
            .coordinator()
            .acquire(&lease_key(&k, Operation::Withdraw))
            .await
            .unwrap();
        h.store.set_subscribe_unavailable(true);

        let err = h
            .orchestrator
            .withdraw(WithdrawCommand::new(A, dec("10.00"), &k).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Subscription(_)));
        assert!(err.is_retryable());
        assert_eq!(h.ledger.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_transfer_replay_after_rollback() {
        let h = harness(Duration::from_secs(1));
        h.ledger.insert_account(A, dec("100.00"));
        let k = key();

        let cmd = TransferCommand::new(A, B, dec("30.00"), &k).unwrap();
        let first = h.orchestrator.transfer(cmd.clone()).await.unwrap();
        let again = h.orchestrator.transfer(cmd).await.unwrap();

        assert_eq!(first.status, OperationStatus::Failed);
        assert_eq!(first, again);
        assert_eq!(h.ledger.balance(A), Some(dec("100.00")));
        assert_eq!(h.ledger.mutation_count(), 1);
    }
}
