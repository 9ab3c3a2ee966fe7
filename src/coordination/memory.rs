//! In-Memory Coordination Store
//!
//! Process-local stand-in for Redis. Leases and stored results carry
//! deadlines and are treated as absent once expired. Expired entries are
//! swept whenever a result is stored. Broadcast channels are
//! `tokio::sync::broadcast` senders created on first subscription and
//! removed on publish or when their last subscriber goes away.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{CoordinationStore, Subscription};
use crate::error::{WalletError, WalletResult};

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
struct Expiring {
    value: String,
    expires_at: Instant,
}

impl Expiring {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

type Channels = Arc<DashMap<String, broadcast::Sender<String>>>;

/// One subscriber's end of a channel; drops the channel with the last one
struct ChannelReceiver {
    channel: String,
    rx: Option<broadcast::Receiver<String>>,
    channels: Channels,
}

impl ChannelReceiver {
    async fn recv(&mut self) -> Option<String> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ChannelReceiver {
    fn drop(&mut self) {
        self.rx.take();
        self.channels
            .remove_if(&self.channel, |_, sender| sender.receiver_count() == 0);
    }
}

/// In-memory coordination store
#[derive(Default)]
pub struct MemoryCoordinationStore {
    leases: DashMap<String, Expiring>,
    results: DashMap<String, Expiring>,
    channels: Channels,
    unavailable: AtomicBool,
    /// Fails `store_result` / `publish` only
    publish_unavailable: AtomicBool,
    /// Fails `subscribe` only
    subscribe_unavailable: AtomicBool,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store being unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Simulate an outage that hits the holder after it took the lease
    pub fn set_publish_unavailable(&self, unavailable: bool) {
        self.publish_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Simulate the pub/sub connection failing for waiters
    pub fn set_subscribe_unavailable(&self, unavailable: bool) {
        self.subscribe_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether a live lease exists for `key`
    pub fn has_lease(&self, key: &str) -> bool {
        self.leases.get(key).map(|l| l.is_live()).unwrap_or(false)
    }

    fn check_available(&self) -> WalletResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WalletError::Coordination(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn check_publish_available(&self) -> WalletResult<()> {
        self.check_available()?;
        if self.publish_unavailable.load(Ordering::SeqCst) {
            return Err(WalletError::Coordination(
                "memory store rejected publish".to_string(),
            ));
        }
        Ok(())
    }

    fn sweep_expired(&self) {
        self.results.retain(|_, r| r.is_live());
        self.leases.retain(|_, l| l.is_live());
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn try_create(&self, key: &str, token: &str, ttl: Duration) -> WalletResult<bool> {
        self.check_available()?;
        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                if e.get().is_live() {
                    Ok(false)
                } else {
                    e.insert(Expiring::new(token, ttl));
                    Ok(true)
                }
            }
            Entry::Vacant(e) => {
                e.insert(Expiring::new(token, ttl));
                Ok(true)
            }
        }
    }

    async fn refresh(&self, key: &str, token: &str, ttl: Duration) -> WalletResult<bool> {
        self.check_available()?;
        match self.leases.get_mut(key) {
            Some(mut lease) if lease.is_live() && lease.value == token => {
                lease.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_owner(&self, key: &str, token: &str) -> WalletResult<bool> {
        self.check_available()?;
        Ok(self
            .leases
            .remove_if(key, |_, lease| lease.is_live() && lease.value == token)
            .is_some())
    }

    async fn store_result(&self, key: &str, payload: &str, ttl: Duration) -> WalletResult<()> {
        self.check_publish_available()?;
        self.sweep_expired();
        self.results
            .insert(key.to_string(), Expiring::new(payload, ttl));
        Ok(())
    }

    async fn load_result(&self, key: &str) -> WalletResult<Option<String>> {
        self.check_available()?;
        self.results.remove_if(key, |_, r| !r.is_live());
        Ok(self
            .results
            .get(key)
            .filter(|r| r.is_live())
            .map(|r| r.value.clone()))
    }

    async fn publish(&self, channel: &str, payload: &str) -> WalletResult<()> {
        self.check_publish_available()?;
        // Current subscribers keep the buffered message after the sender is dropped
        if let Some((_, sender)) = self.channels.remove(channel) {
            let _ = sender.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> WalletResult<Subscription> {
        if self.unavailable.load(Ordering::SeqCst)
            || self.subscribe_unavailable.load(Ordering::SeqCst)
        {
            return Err(WalletError::Subscription(
                "memory store marked unavailable".to_string(),
            ));
        }

        let rx = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        let receiver = ChannelReceiver {
            channel: channel.to_string(),
            rx: Some(rx),
            channels: self.channels.clone(),
        };

        let messages = futures::stream::unfold(receiver, |mut receiver| async move {
            let message = receiver.recv().await?;
            Some((Ok(message), receiver))
        });

        Ok(Subscription::new(messages.boxed()))
    }

    async fn health_check(&self) -> WalletResult<()> {
        self.check_available()
    }
}
