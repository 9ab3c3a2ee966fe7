//! Wallet Ledger - process bootstrap
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────┐
//! │ Gateway  │───▶│ Orchestrator │───▶│ Coordination │    │  Ledger  │
//! │  (axum)  │    │              │───▶│   (Redis)    │    │(Postgres)│
//! └──────────┘    └──────────────┘────────────────────────▶└──────────┘
//! ```
//!
//! Usage: `wallet_ledger [--env dev] [--port 8080]`

use anyhow::Context;
use std::sync::Arc;

use wallet_ledger::config::{AppConfig, StorageBackend};
use wallet_ledger::coordination::{
    CoordinationStore, IdempotencyCoordinator, LeaseSettings, MemoryCoordinationStore,
    RedisCoordinationStore,
};
use wallet_ledger::db::Database;
use wallet_ledger::gateway::{self, AppState};
use wallet_ledger::ledger::{LedgerStore, MemoryLedger, PgLedger, TransactionLookup};
use wallet_ledger::orchestrator::{OperationOrchestrator, OrchestratorConfig};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn build_backends(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn LedgerStore>, Arc<dyn CoordinationStore>)> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            let postgres_url = config
                .postgres_url
                .as_deref()
                .context("postgres_url is required for the postgres backend")?;
            let db = Database::connect(postgres_url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.migrate().await.context("Failed to apply migrations")?;

            let redis_url = config
                .redis_url
                .as_deref()
                .context("redis_url is required for the postgres backend")?;
            let store = RedisCoordinationStore::from_url(redis_url)?;
            store.health_check().await.context("Redis is unreachable")?;
            tracing::info!("Redis coordination store ready");

            let ledger: Arc<dyn LedgerStore> = Arc::new(PgLedger::new(db.pool().clone()));
            let store: Arc<dyn CoordinationStore> = Arc::new(store);
            Ok((ledger, store))
        }
        StorageBackend::Memory => {
            tracing::warn!("In-memory backend: state is lost on exit and not shared across processes");
            let ledger: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
            let store: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordinationStore::new());
            Ok((ledger, store))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env).with_context(|| format!("Failed to load config for env {}", env))?;
    let _log_guard = wallet_ledger::logging::init_logging(&config);

    tracing::info!(
        env = %env,
        git = env!("GIT_HASH"),
        backend = ?config.storage_backend,
        "Starting wallet ledger"
    );

    let (ledger, store) = build_backends(&config).await?;

    let coordinator = IdempotencyCoordinator::new(store, LeaseSettings::from(&config.idempotency));
    let orchestrator = OperationOrchestrator::new(
        coordinator,
        ledger.clone(),
        TransactionLookup::new(ledger),
        OrchestratorConfig::from(&config.idempotency),
    );
    let state = Arc::new(AppState::new(Arc::new(orchestrator)));

    let port = get_port_override().unwrap_or(config.gateway.port);
    gateway::run_server(&config.gateway.host, port, state, shutdown_signal())
        .await
        .context("Gateway server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}
