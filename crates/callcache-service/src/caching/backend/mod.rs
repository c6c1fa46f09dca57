use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::CacheKey;

mod memory;

pub use memory::InMemoryBackend;

/// A byte-oriented key/value store with per-entry expiration.
///
/// Implementations must be safe to use concurrently for any number of keys. Entries are never
/// deleted explicitly, they are expected to vanish once their TTL elapses.
#[async_trait]
pub trait CacheBackend: Send + Sync + fmt::Debug {
    /// Loads the value stored for `key`.
    ///
    /// Returns `Ok(None)` if there is no such entry. Callers treat an error the same way as a
    /// missing entry, adapters that want to tell these apart have to do so internally.
    async fn get_bytes(&self, key: &CacheKey) -> anyhow::Result<Option<Bytes>>;

    /// Stores `value` for `key`, replacing any existing entry, for at most `ttl`.
    async fn set_bytes(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> anyhow::Result<()>;
}
