//! HTTP Gateway
//!
//! ```text
//! POST /v1/accounts                    create account
//! GET  /v1/accounts/{id}               balance
//! GET  /v1/accounts/{id}/transactions  history
//! POST /v1/deposit                     {id, amount}        + Idempotency-Key
//! POST /v1/withdraw                    {id, amount}        + Idempotency-Key
//! POST /v1/transfer                    {from, to, amount}  + Idempotency-Key
//! GET  /v1/health
//! GET  /docs                           Swagger UI
//! ```

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use state::AppState;

/// Build the full router
pub fn router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/accounts", post(handlers::create_account))
        .route("/accounts/{id}", get(handlers::get_account))
        .route("/accounts/{id}/transactions", get(handlers::list_transactions))
        .route("/deposit", post(handlers::deposit))
        .route("/withdraw", post(handlers::withdraw))
        .route("/transfer", post(handlers::transfer));

    Router::new()
        .nest("/v1", v1)
        .with_state(state)
        // Stateless, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Serve until `shutdown` resolves
pub async fn run_server<F>(
    host: &str,
    port: u16,
    state: Arc<AppState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind, port may already be in use");
        e
    })?;

    tracing::info!("Gateway listening on http://{}", addr);
    tracing::info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
