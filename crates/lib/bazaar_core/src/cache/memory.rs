//! In-process secret cache for tests and `--memory` runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream;
use tokio::sync::broadcast;

use super::{CacheError, CacheMessage, CacheStream, SecretCache, glob_match};

const BUS_CAPACITY: usize = 256;
/// Expired entries are swept once every this many writes.
const PURGE_EVERY: usize = 256;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Expiring key/value map plus a broadcast bus standing in for pub/sub.
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    writes: AtomicUsize,
    bus: broadcast::Sender<CacheMessage>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            entries: DashMap::new(),
            writes: AtomicUsize::new(0),
            bus,
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys starting with `prefix`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().is_live())
            .count()
    }

    fn purge_expired(&self) {
        self.entries.retain(|_, e| e.is_live());
    }
}

#[async_trait]
impl SecretCache for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1).is_multiple_of(PURGE_EVERY) {
            self.purge_expired();
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .entries
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone()))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .entries
            .remove(key)
            .map(|(_, e)| e)
            .filter(Entry::is_live)
            .map(|e| e.value))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, e)| e.is_live()))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(&key)
                && entry.is_live()
            {
                removed += 1;
            }
        }
        self.purge_expired();
        Ok(removed)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), CacheError> {
        // No subscribers is not an error.
        let _ = self.bus.send(CacheMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<CacheStream, CacheError> {
        let rx = self.bus.subscribe();
        let pattern = pattern.to_string();
        let stream = stream::unfold((rx, pattern), |(mut rx, pattern)| async move {
            loop {
                match rx.recv().await {
                    Ok(msg) if glob_match(&pattern, &msg.channel) => {
                        return Some((msg, (rx, pattern)));
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
