//! Idempotency Coordination
//!
//! Single-acquirer, multi-waiter exclusivity per idempotency key, delegated
//! to an external store so it holds across process instances.
//!
//! # Keys
//!
//! ```text
//! lease      {idempotency_key}_{Operation}          value = per-acquirer token
//! result     {idempotency_key}_{Operation}:result   value = JSON OperationResult
//! channel    {idempotency_key}_{Operation}          pub/sub, same name as the lease
//! ```
//!
//! # Lease lifecycle
//!
//! The lease is created with a TTL and refreshed by a keepalive task while
//! the holder runs the mutation. A crashed holder's lease expires and the
//! next request takes over; the ledger lookup stops it from applying the
//! mutation twice. Refresh and release compare the token first, so a holder
//! whose lease already expired can never extend or delete its successor's.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryCoordinationStore;
pub use redis_store::RedisCoordinationStore;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::IdempotencyConfig;
use crate::error::{WalletError, WalletResult};
use crate::orchestrator::Operation;

/// Lease key for one operation attempt
pub fn lease_key(idempotency_key: &str, operation: Operation) -> String {
    format!("{}_{}", idempotency_key, operation.as_str())
}

/// Key under which the published result is kept for late waiters
pub fn result_key(lease_key: &str) -> String {
    format!("{}:result", lease_key)
}

// ============================================================================
// Backend primitives
// ============================================================================

/// Live subscription to one broadcast channel
pub struct Subscription {
    messages: BoxStream<'static, WalletResult<String>>,
}

impl Subscription {
    pub fn new(messages: BoxStream<'static, WalletResult<String>>) -> Self {
        Self { messages }
    }

    /// Next payload published on the channel
    pub async fn next_message(&mut self) -> WalletResult<String> {
        match self.messages.next().await {
            Some(message) => message,
            None => Err(WalletError::Subscription("channel closed".to_string())),
        }
    }
}

/// Coordination backend
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Atomically create `key = token` with expiry if absent
    async fn try_create(&self, key: &str, token: &str, ttl: Duration) -> WalletResult<bool>;

    /// Extend expiry only while `key` still holds `token`
    async fn refresh(&self, key: &str, token: &str, ttl: Duration) -> WalletResult<bool>;

    /// Delete `key` only while it still holds `token`
    async fn delete_if_owner(&self, key: &str, token: &str) -> WalletResult<bool>;

    async fn store_result(&self, key: &str, payload: &str, ttl: Duration) -> WalletResult<()>;

    async fn load_result(&self, key: &str) -> WalletResult<Option<String>>;

    async fn publish(&self, channel: &str, payload: &str) -> WalletResult<()>;

    /// The subscription is active when this returns
    async fn subscribe(&self, channel: &str) -> WalletResult<Subscription>;

    async fn health_check(&self) -> WalletResult<()>;
}

// ============================================================================
// Coordinator
// ============================================================================

/// Lease timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSettings {
    pub lease_ttl: Duration,
    pub lease_refresh: Duration,
    pub result_ttl: Duration,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_millis(30_000),
            lease_refresh: Duration::from_millis(10_000),
            result_ttl: Duration::from_millis(60_000),
        }
    }
}

impl From<&IdempotencyConfig> for LeaseSettings {
    fn from(c: &IdempotencyConfig) -> Self {
        Self {
            lease_ttl: Duration::from_millis(c.lease_ttl_ms),
            lease_refresh: Duration::from_millis(c.lease_refresh_ms),
            result_ttl: Duration::from_millis(c.result_ttl_ms),
        }
    }
}

/// Outcome of [`IdempotencyCoordinator::acquire`]
///
/// Dropping a held guard without [`IdempotencyCoordinator::release`] stops
/// the keepalive and leaves the lease to expire.
#[derive(Debug)]
pub struct LeaseGuard {
    key: String,
    token: String,
    held: bool,
    keepalive: Option<JoinHandle<()>>,
}

impl LeaseGuard {
    /// Whether this caller owns execution rights
    #[inline]
    pub fn is_held(&self) -> bool {
        self.held
    }

    fn stop_keepalive(&mut self) {
        if let Some(handle) = self.keepalive.take() {
            handle.abort();
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.stop_keepalive();
    }
}

/// Idempotency coordinator
#[derive(Clone)]
pub struct IdempotencyCoordinator {
    store: Arc<dyn CoordinationStore>,
    settings: LeaseSettings,
}

impl IdempotencyCoordinator {
    pub fn new(store: Arc<dyn CoordinationStore>, settings: LeaseSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    /// Try to become the executor for `key`
    ///
    /// Not holding the lease is a normal outcome, not an error.
    pub async fn acquire(&self, key: &str) -> WalletResult<LeaseGuard> {
        let token = Uuid::new_v4().to_string();
        let held = self
            .store
            .try_create(key, &token, self.settings.lease_ttl)
            .await?;

        if !held {
            debug!(lease_key = %key, "Lease contended");
            return Ok(LeaseGuard {
                key: key.to_string(),
                token,
                held: false,
                keepalive: None,
            });
        }

        debug!(lease_key = %key, "Lease acquired");
        let keepalive = self.spawn_keepalive(key, &token);
        Ok(LeaseGuard {
            key: key.to_string(),
            token,
            held: true,
            keepalive,
        })
    }

    fn spawn_keepalive(&self, key: &str, token: &str) -> Option<JoinHandle<()>> {
        let period = self.settings.lease_refresh;
        if period.is_zero() {
            return None;
        }

        let store = self.store.clone();
        let ttl = self.settings.lease_ttl;
        let key = key.to_string();
        let token = token.to_string();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.refresh(&key, &token, ttl).await {
                    Ok(true) => debug!(lease_key = %key, "Lease refreshed"),
                    Ok(false) => {
                        warn!(lease_key = %key, "Lease lost before release, stopping keepalive");
                        break;
                    }
                    Err(e) => warn!(lease_key = %key, error = %e, "Lease refresh failed"),
                }
            }
        }))
    }

    /// Give the lease back
    ///
    /// Only a held guard deletes anything. Failures are logged and never
    /// surface to the request: the lease expires on its own.
    pub async fn release(&self, mut guard: LeaseGuard) {
        guard.stop_keepalive();
        if !guard.held {
            return;
        }

        match self.store.delete_if_owner(&guard.key, &guard.token).await {
            Ok(true) => debug!(lease_key = %guard.key, "Lease released"),
            Ok(false) => warn!(
                lease_key = %guard.key,
                "Lease already expired or taken over at release"
            ),
            Err(e) => error!(lease_key = %guard.key, error = %e, "Failed to release lease"),
        }
    }

    /// Store the result for late waiters, then broadcast it
    pub async fn publish<T: Serialize + Sync>(&self, key: &str, result: &T) -> WalletResult<()> {
        let payload = serde_json::to_string(result)?;
        self.store
            .store_result(&result_key(key), &payload, self.settings.result_ttl)
            .await?;
        self.store.publish(key, &payload).await?;
        info!(lease_key = %key, "Result published");
        Ok(())
    }

    /// Wait for the lease holder's result
    ///
    /// Subscribes before reading the stored result so a publish racing with
    /// the subscription is never missed.
    pub async fn await_result<T: DeserializeOwned>(
        &self,
        key: &str,
        timeout: Duration,
    ) -> WalletResult<T> {
        let mut subscription = self.store.subscribe(key).await?;

        if let Some(payload) = self.store.load_result(&result_key(key)).await? {
            debug!(lease_key = %key, "Result already stored");
            return Ok(serde_json::from_str(&payload)?);
        }

        match tokio::time::timeout(timeout, subscription.next_message()).await {
            Ok(Ok(payload)) => {
                debug!(lease_key = %key, "Result received from broadcast");
                Ok(serde_json::from_str(&payload)?)
            }
            Ok(Err(e)) => {
                warn!(lease_key = %key, error = %e, "Result subscription failed");
                Err(e)
            }
            Err(_) => {
                warn!(lease_key = %key, timeout_ms = timeout.as_millis() as u64, "Timed out waiting for result");
                Err(WalletError::Timeout(key.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        value: u32,
    }

    fn coordinator(settings: LeaseSettings) -> (IdempotencyCoordinator, Arc<MemoryCoordinationStore>) {
        let store = Arc::new(MemoryCoordinationStore::new());
        (IdempotencyCoordinator::new(store.clone(), settings), store)
    }

    #[test]
    fn test_key_format() {
        let key = lease_key("45c48cce-2e2d-4fbd-a7e8-3b9b1b4c5d12", Operation::Deposit);
        assert_eq!(key, "45c48cce-2e2d-4fbd-a7e8-3b9b1b4c5d12_Deposit");
        assert_eq!(result_key(&key), format!("{}:result", key));
    }

    #[tokio::test]
    async fn test_single_acquirer() {
        let (coord, store) = coordinator(LeaseSettings::default());

        let first = coord.acquire("k_Deposit").await.unwrap();
        let second = coord.acquire("k_Deposit").await.unwrap();
        assert!(first.is_held());
        assert!(!second.is_held());

        // Non-holder release must not delete the holder's lease
        coord.release(second).await;
        assert!(store.has_lease("k_Deposit"));

        coord.release(first).await;
        assert!(!store.has_lease("k_Deposit"));
        assert!(coord.acquire("k_Deposit").await.unwrap().is_held());
    }

    #[tokio::test]
    async fn test_keys_scoped_by_operation() {
        let (coord, _) = coordinator(LeaseSettings::default());
        assert!(coord.acquire("k_Deposit").await.unwrap().is_held());
        assert!(coord.acquire("k_Withdraw").await.unwrap().is_held());
    }

    #[tokio::test]
    async fn test_expired_lease_taken_over() {
        let settings = LeaseSettings {
            lease_ttl: Duration::from_millis(50),
            lease_refresh: Duration::ZERO,
            result_ttl: Duration::from_secs(1),
        };
        let (coord, _) = coordinator(settings);

        let stale = coord.acquire("k_Deposit").await.unwrap();
        assert!(stale.is_held());
        tokio::time::sleep(Duration::from_millis(80)).await;

        let successor = coord.acquire("k_Deposit").await.unwrap();
        assert!(successor.is_held());

        // The stale holder cannot delete its successor's lease
        coord.release(stale).await;
        assert!(!coord.acquire("k_Deposit").await.unwrap().is_held());
        coord.release(successor).await;
    }

    #[tokio::test]
    async fn test_keepalive_extends_lease() {
        let settings = LeaseSettings {
            lease_ttl: Duration::from_millis(100),
            lease_refresh: Duration::from_millis(25),
            result_ttl: Duration::from_secs(1),
        };
        let (coord, _) = coordinator(settings);

        let guard = coord.acquire("k_Transfer").await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!coord.acquire("k_Transfer").await.unwrap().is_held());
        coord.release(guard).await;
    }

    #[tokio::test]
    async fn test_waiter_receives_broadcast() {
        let (coord, _) = coordinator(LeaseSettings::default());

        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move {
                coord
                    .await_result::<Payload>("k_Deposit", Duration::from_secs(2))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        coord.publish("k_Deposit", &Payload { value: 7 }).await.unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), Payload { value: 7 });
    }

    #[tokio::test]
    async fn test_late_waiter_reads_stored_result() {
        let (coord, _) = coordinator(LeaseSettings::default());
        coord.publish("k_Withdraw", &Payload { value: 3 }).await.unwrap();

        let got: Payload = coord
            .await_result("k_Withdraw", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(got, Payload { value: 3 });
    }

    #[tokio::test]
    async fn test_await_times_out() {
        let (coord, _) = coordinator(LeaseSettings::default());
        let err = coord
            .await_result::<Payload>("k_Deposit", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, WalletError::Timeout("k_Deposit".to_string()));
    }

    #[tokio::test]
    async fn test_unavailable_store_surfaces_coordination_error() {
        let (coord, store) = coordinator(LeaseSettings::default());
        store.set_unavailable(true);
        assert!(matches!(
            coord.acquire("k_Deposit").await,
            Err(WalletError::Coordination(_))
        ));
    }
}
