//! Transaction Lookup
//!
//! Crash-recovery check used by the orchestrator once it holds a lease:
//! if records already exist for the idempotency key the mutation is not
//! run again and the stored outcome is replayed.

use std::sync::Arc;

use super::LedgerStore;
use super::types::LedgerTransaction;
use crate::error::WalletResult;
use crate::orchestrator::Operation;

/// Read-only view over the transaction log
#[derive(Clone)]
pub struct TransactionLookup {
    store: Arc<dyn LedgerStore>,
}

impl TransactionLookup {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// All records with `transaction_id == txn_id`, empty when none
    pub async fn find_by_transaction_id(&self, txn_id: &str) -> WalletResult<Vec<LedgerTransaction>> {
        self.store.find_by_transaction_id(txn_id).await
    }

    /// Records under `txn_id` that `operation` could have written
    ///
    /// A key reused across operations (deposit then withdraw) must not
    /// replay the other operation's outcome.
    pub async fn find_for(
        &self,
        operation: Operation,
        txn_id: &str,
    ) -> WalletResult<Vec<LedgerTransaction>> {
        let records = self.store.find_by_transaction_id(txn_id).await?;
        Ok(records
            .into_iter()
            .filter(|r| operation.record_types().contains(&r.txn_type))
            .collect())
    }
}
