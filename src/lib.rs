//! Wallet Ledger - idempotent deposit, withdraw and transfer
//!
//! Every mutation carries a caller-supplied idempotency key. Exactly one
//! request per `{key, operation}` executes; concurrent duplicates receive
//! the executor's broadcast result and later retries replay the stored
//! outcome.
//!
//! # Modules
//!
//! - [`money`] - Fixed-point amount parsing and formatting
//! - [`error`] - Error taxonomy shared by every layer
//! - [`ledger`] - Balances + transaction log (Postgres / in-memory)
//! - [`coordination`] - Leases and result broadcast (Redis / in-memory)
//! - [`orchestrator`] - Per-operation idempotency protocol
//! - [`gateway`] - HTTP API (axum)
//! - [`config`] / [`logging`] / [`db`] - Process plumbing

pub mod config;
pub mod coordination;
pub mod db;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod orchestrator;

// Convenient re-exports at crate root
pub use coordination::{CoordinationStore, IdempotencyCoordinator, LeaseSettings};
pub use error::{WalletError, WalletResult};
pub use ledger::{LedgerStore, TransactionLookup};
pub use orchestrator::{OperationOrchestrator, OrchestratorConfig};
