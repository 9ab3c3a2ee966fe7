use std::sync::Arc;

use crate::ledger::LedgerStore;
use crate::orchestrator::OperationOrchestrator;

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    /// Mutations go through the orchestrator
    pub orchestrator: Arc<OperationOrchestrator>,
    /// Read path (balances, history)
    pub ledger: Arc<dyn LedgerStore>,
}

impl AppState {
    pub fn new(orchestrator: Arc<OperationOrchestrator>) -> Self {
        let ledger = orchestrator.ledger().clone();
        Self {
            orchestrator,
            ledger,
        }
    }
}
