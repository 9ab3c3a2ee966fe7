//! Application Configuration
//!
//! Loaded from `config/{env}.yaml`. Missing optional sections fall back to
//! defaults; missing required keys are a load error.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage_backend: StorageBackend,
    /// Required when `storage_backend: postgres`
    #[serde(default)]
    pub postgres_url: Option<String>,
    /// Required when `storage_backend: postgres`
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

/// Where balances, the transaction log and leases live
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// PostgreSQL ledger + Redis coordination
    #[default]
    Postgres,
    /// Single-process, in-memory ledger and coordination
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Contended requests wait this long for the holder's result
    pub wait_timeout_ms: u64,
    pub lease_ttl_ms: u64,
    /// Keepalive period; must be shorter than `lease_ttl_ms`
    pub lease_refresh_ms: u64,
    /// How long a published result stays readable for late waiters
    pub result_ttl_ms: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 5_000,
            lease_ttl_ms: 30_000,
            lease_refresh_ms: 10_000,
            result_ttl_ms: 60_000,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::load_from(format!("config/{}.yaml", env))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path_str.clone(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path_str,
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let idem = &self.idempotency;
        if idem.lease_ttl_ms == 0 {
            return Err(ConfigError::Invalid("idempotency.lease_ttl_ms must be > 0".into()));
        }
        if idem.lease_refresh_ms >= idem.lease_ttl_ms {
            return Err(ConfigError::Invalid(
                "idempotency.lease_refresh_ms must be shorter than lease_ttl_ms".into(),
            ));
        }
        if self.storage_backend == StorageBackend::Postgres {
            if self.postgres_url.is_none() {
                return Err(ConfigError::Invalid("postgres_url is required".into()));
            }
            if self.redis_url.is_none() {
                return Err(ConfigError::Invalid("redis_url is required".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
log_level: info
log_dir: ./logs
log_file: wallet.log
use_json: false
rotation: daily
gateway:
  host: 0.0.0.0
  port: 8080
"#;

    #[test]
    fn test_memory_backend_defaults() {
        let yaml = format!("{}storage_backend: memory\n", BASE);
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.idempotency, IdempotencyConfig::default());
        assert_eq!(config.idempotency.wait_timeout_ms, 5_000);
    }

    #[test]
    fn test_postgres_requires_urls() {
        let err = AppConfig::from_yaml(BASE).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let yaml = format!(
            "{}postgres_url: postgresql://localhost/wallet\nredis_url: redis://localhost:6379\n",
            BASE
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Postgres);
    }

    #[test]
    fn test_refresh_must_be_shorter_than_ttl() {
        let yaml = format!(
            "{}storage_backend: memory\nidempotency:\n  lease_ttl_ms: 1000\n  lease_refresh_ms: 1000\n",
            BASE
        );
        assert!(matches!(
            AppConfig::from_yaml(&yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_partial_idempotency_section() {
        let yaml = format!(
            "{}storage_backend: memory\nidempotency:\n  wait_timeout_ms: 250\n",
            BASE
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.idempotency.wait_timeout_ms, 250);
        assert_eq!(config.idempotency.lease_ttl_ms, 30_000);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AppConfig::load("does-not-exist"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_shipped_dev_config_loads() {
        let config = AppConfig::load_from(concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.yaml"))
            .unwrap();
        assert_eq!(config.gateway.port, 8080);
    }
}
