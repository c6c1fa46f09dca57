use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;

use super::CacheBackend;
use crate::caching::CacheKey;
use crate::config::InMemoryCacheConfig;

/// An item saved in the in-memory moka cache.
#[derive(Clone, Debug)]
struct InMemoryItem {
    /// When to evict this item from the in-memory cache.
    deadline: Instant,
    /// The framed cache record.
    data: Bytes,
}

type InMemoryCache = moka::future::Cache<CacheKey, InMemoryItem>;

/// A [`CacheBackend`] keeping records in process memory.
///
/// Records are weighted by their size and evicted once the configured capacity is exceeded, or
/// when their TTL elapses. Records with a zero TTL are not stored at all.
///
/// This is meant for tests and local development, records are neither persisted nor shared
/// between processes.
#[derive(Clone)]
pub struct InMemoryBackend {
    cache: InMemoryCache,
}

impl fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("in-memory items", &self.cache.entry_count())
            .field("weighted size", &self.cache.weighted_size())
            .finish()
    }
}

/// A struct implementing [`moka::Expiry`] that uses the [`InMemoryItem`] [`Instant`] as the explicit
/// expiration time.
struct CacheExpiration;

/// Returns the duration between the `current_time` and `target_time` in the future.
/// In case the `target_time` is already elapsed (it is in the past relative to `current_time`), this
/// will return `Some(ZERO)`.
fn saturating_duration_since(current_time: Instant, target_time: Instant) -> Option<Duration> {
    Some(
        target_time
            .checked_duration_since(current_time)
            .unwrap_or_default(),
    )
}

impl moka::Expiry<CacheKey, InMemoryItem> for CacheExpiration {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &InMemoryItem,
        current_time: Instant,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &InMemoryItem,
        current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }
}

impl InMemoryBackend {
    /// Creates a backend holding records of up to `capacity` bytes in total.
    pub fn new(capacity: u64) -> Self {
        let cache = InMemoryCache::builder()
            .max_capacity(capacity)
            .name("callcache")
            .expire_after(CacheExpiration)
            // NOTE: we count the bookkeeping structures to the weight as well
            .weigher(|_k, v: &InMemoryItem| {
                let value_size = u32::try_from(v.data.len()).unwrap_or(u32::MAX);
                (std::mem::size_of::<(CacheKey, Instant)>() as u32).saturating_add(value_size)
            })
            .build();

        Self { cache }
    }

    pub fn from_config(config: &InMemoryCacheConfig) -> Self {
        Self::new(config.capacity)
    }

    /// The number of records currently held.
    ///
    /// This is an approximation that lags behind pending evictions.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get_bytes(&self, key: &CacheKey) -> anyhow::Result<Option<Bytes>> {
        Ok(self.cache.get(key).await.map(|item| item.data))
    }

    async fn set_bytes(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> anyhow::Result<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        let now = Instant::now();
        let deadline = now.checked_add(ttl).unwrap_or(now + Duration::from_secs(86400 * 365));
        let item = InMemoryItem {
            deadline,
            data: value,
        };
        self.cache.insert(*key, item).await;
        Ok(())
    }
}
