//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{AmountRequest, TransferRequest};
use crate::ledger::{Account, LedgerTransaction, TxnStatus, TxnType};
use crate::orchestrator::{DepositResult, OperationStatus, TransferResult, WithdrawResult};

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Wallet Ledger API",
        version = "1.0.0",
        description = "Idempotent deposit, withdraw and transfer. Every mutation requires an \
                       Idempotency-Key header; retries with the same key return the original outcome.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        crate::gateway::handlers::account::create_account,
        crate::gateway::handlers::account::get_account,
        crate::gateway::handlers::account::list_transactions,
        crate::gateway::handlers::operation::deposit,
        crate::gateway::handlers::operation::withdraw,
        crate::gateway::handlers::operation::transfer,
    ),
    components(
        schemas(
            HealthResponse,
            Account,
            LedgerTransaction,
            TxnType,
            TxnStatus,
            AmountRequest,
            TransferRequest,
            DepositResult,
            WithdrawResult,
            TransferResult,
            OperationStatus,
        )
    ),
    tags(
        (name = "Account", description = "Account creation and queries"),
        (name = "Operations", description = "Idempotent balance mutations"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Wallet Ledger API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_json_serializable() {
        let json = ApiDoc::openapi().to_json();
        assert!(json.is_ok());
        assert!(json.unwrap().contains("Wallet Ledger API"));
    }

    #[test]
    fn test_endpoints_registered() {
        let paths = ApiDoc::openapi().paths;
        for path in [
            "/v1/health",
            "/v1/accounts",
            "/v1/accounts/{id}",
            "/v1/accounts/{id}/transactions",
            "/v1/deposit",
            "/v1/withdraw",
            "/v1/transfer",
        ] {
            assert!(paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
