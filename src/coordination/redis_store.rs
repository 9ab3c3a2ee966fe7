//! Redis Coordination Store
//!
//! Commands go through a `deadpool-redis` pool; every subscription opens its
//! own async pub/sub connection from the `redis::Client`, since a connection
//! in subscribe mode cannot run ordinary commands.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures::StreamExt;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use super::{CoordinationStore, Subscription};
use crate::error::{WalletError, WalletResult};

/// Returns the new PEXPIRE result when the token matches, else 0
const REFRESH_SCRIPT: &str = r"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('PEXPIRE', KEYS[1], ARGV[2])
    end
    return 0
";

/// Returns 1 when the token matched and the key was deleted, else 0
const RELEASE_SCRIPT: &str = r"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
";

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Redis-backed coordination store
pub struct RedisCoordinationStore {
    pool: Pool,
    client: redis::Client,
}

impl RedisCoordinationStore {
    pub fn new(pool: Pool, client: redis::Client) -> Self {
        Self { pool, client }
    }

    /// Build the command pool and the pub/sub client from one URL
    pub fn from_url(redis_url: &str) -> WalletResult<Self> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| WalletError::Coordination(e.to_string()))?;
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(pool, client))
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn try_create(&self, key: &str, token: &str, ttl: Duration) -> WalletResult<bool> {
        let mut conn = self.pool.get().await?;
        // SET NX replies OK when created, nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn refresh(&self, key: &str, token: &str, ttl: Duration) -> WalletResult<bool> {
        let mut conn = self.pool.get().await?;
        let refreshed: i64 = redis::Script::new(REFRESH_SCRIPT)
            .key(key)
            .arg(token)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut *conn)
            .await?;
        Ok(refreshed == 1)
    }

    async fn delete_if_owner(&self, key: &str, token: &str) -> WalletResult<bool> {
        let mut conn = self.pool.get().await?;
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut *conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn store_result(&self, key: &str, payload: &str, ttl: Duration) -> WalletResult<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn load_result(&self, key: &str) -> WalletResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let payload: Option<String> = conn.get(key).await?;
        Ok(payload)
    }

    async fn publish(&self, channel: &str, payload: &str) -> WalletResult<()> {
        let mut conn = self.pool.get().await?;
        let receivers: i64 = conn.publish(channel, payload).await?;
        debug!(channel = %channel, receivers, "Published to channel");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> WalletResult<Subscription> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| WalletError::Subscription(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| WalletError::Subscription(e.to_string()))?;

        let messages = pubsub.into_on_message().map(|msg| {
            msg.get_payload::<String>()
                .map_err(|e| WalletError::Subscription(e.to_string()))
        });

        Ok(Subscription::new(messages.boxed()))
    }

    async fn health_check(&self) -> WalletResult<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok(())
    }
}
