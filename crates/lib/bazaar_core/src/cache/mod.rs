//! Secret cache: short-lived key/value secrets plus the pub/sub bus.
//!
//! Refresh-token records, password-reset and email-verification tokens all
//! live here with a TTL. The same backend carries chat events between
//! instances.

pub mod memory;
pub mod redis;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Cache closed")]
    Closed,
}

/// A message delivered to a pattern subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMessage {
    pub channel: String,
    pub payload: String,
}

/// Stream of messages for one subscription.
pub type CacheStream = Pin<Box<dyn Stream<Item = CacheMessage> + Send>>;

#[async_trait]
pub trait SecretCache: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl_secs`.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Atomically read and delete `key`.
    async fn take(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete every key starting with `prefix`. Returns the count removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), CacheError>;

    /// Subscribe to every channel matching a glob `pattern` (`*` only).
    async fn psubscribe(&self, pattern: &str) -> Result<CacheStream, CacheError>;
}

/// Glob match supporting `*` wildcards, as used by `PSUBSCRIBE`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let (first, rest) = (parts[0], &parts[1..]);
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };
    let last = rest[rest.len() - 1];
    for part in &rest[..rest.len() - 1] {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}
