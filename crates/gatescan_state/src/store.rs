//! The `StateStore` trait and URL-dispatched backend selection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Shared handle to a store backend.
pub type SharedStore = Arc<dyn StateStore>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store transport error: {0}")]
    Transport(#[from] redis::RedisError),
    #[error("unsupported state store URL: {0}")]
    UnsupportedUrl(String),
}

/// Uniform interface over a key-value + list-queue + set backend.
///
/// Every operation carries its own deadline where it can block; none of them
/// busy-wait. Implementations must keep `pop` order-respecting: the first
/// listed queue is always checked first.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Append a payload to the head of a queue.
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<(), StoreError>;

    /// Block until any listed queue has an element, tail end first.
    /// Returns `(queue, payload)` or `None` on timeout.
    async fn pop(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, Vec<u8>)>, StoreError>;

    /// Set a value with optional TTL; with `nx` only when absent.
    /// Returns whether the value was written.
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ex: Option<Duration>,
        nx: bool,
    ) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError>;

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError>;

    async fn srem(&self, set: &str, member: &str) -> Result<(), StoreError>;

    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Append a value to the tail of a list (chunk pipe writes).
    async fn rpush(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Atomically pop-left from `src` and push-right to `dst`, blocking up to
    /// `timeout`. The follower loop of the byte pipe is built on this.
    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Parsed state store URL.
#[derive(Debug, Clone)]
pub enum StoreUrl {
    Redis(String),
    Memory,
}

impl StoreUrl {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if raw.starts_with("redis://") || raw.starts_with("rediss://") {
            return Ok(Self::Redis(raw.to_string()));
        }
        if raw == "memory://" || raw == "memory" {
            return Ok(Self::Memory);
        }
        Err(StoreError::UnsupportedUrl(raw.to_string()))
    }
}

/// Open a store backend for the given URL.
pub async fn open(raw: &str) -> Result<SharedStore, StoreError> {
    match StoreUrl::parse(raw)? {
        StoreUrl::Redis(url) => Ok(Arc::new(crate::redis_store::RedisStore::connect(&url).await?)),
        StoreUrl::Memory => Ok(Arc::new(crate::memory::MemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_scheme_dispatch() {
        assert!(matches!(
            StoreUrl::parse("redis://localhost:6379"),
            Ok(StoreUrl::Redis(_))
        ));
        assert!(matches!(StoreUrl::parse("memory://"), Ok(StoreUrl::Memory)));
        assert!(matches!(
            StoreUrl::parse("postgres://nope"),
            Err(StoreError::UnsupportedUrl(_))
        ));
    }
}
