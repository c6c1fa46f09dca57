use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared, TryFutureExt};
use parking_lot::Mutex;
use sentry::{Hub, SentryFutureExt};
use tokio::runtime::Handle;

use super::{CacheEntry, CacheError, CacheKey};
use crate::utils::futures::CallOnDrop;

type ComputationChannel<T> = Shared<oneshot::Receiver<CacheEntry<T>>>;
type ComputationMap<T> = Arc<Mutex<BTreeMap<CacheKey, ComputationChannel<T>>>>;

/// Deduplicates concurrent computations of the same [`CacheKey`].
///
/// The first caller for a key spawns its computation, every caller arriving while that
/// computation is in flight attaches to it and receives a clone of its result. Once the
/// computation finishes, the key is released, and the next caller starts a fresh computation.
/// Nothing is memoized beyond that.
///
/// Computations run as independent tasks: dropping the future of the caller that started a
/// computation does not cancel it, and the remaining callers still receive its result.
pub struct Coalescer<T> {
    current_computations: ComputationMap<T>,
}

impl<T> Clone for Coalescer<T> {
    fn clone(&self) -> Self {
        Self {
            current_computations: Arc::clone(&self.current_computations),
        }
    }
}

impl<T> Default for Coalescer<T> {
    fn default() -> Self {
        Self {
            current_computations: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl<T> fmt::Debug for Coalescer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coalescer")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl<T> Coalescer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of keys currently being computed.
    pub fn in_flight(&self) -> usize {
        self.current_computations.lock().len()
    }
}

impl<T> Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a shareable channel that computes an item.
    ///
    /// The computation is spawned on `runtime` and removes itself from `current_computations`
    /// right before sending its result.
    fn create_channel<F>(
        &self,
        runtime: &Handle,
        key: CacheKey,
        computation: F,
    ) -> ComputationChannel<T>
    where
        F: Future<Output = CacheEntry<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let current_computations = self.current_computations.clone();
        let remove_computation_token = CallOnDrop::new(move || {
            let mut current_computations = current_computations.lock();
            current_computations.remove(&key);
            metric!(gauge("caches.computations.in_flight") = current_computations.len() as u64);
        });

        let channel = async move {
            let result = computation.await;
            // Drop the token first to evict from the map. This ensures that callers either
            // get a channel that will receive data, or they create a new channel.
            drop(remove_computation_token);
            sender.send(result).ok();
        }
        .bind_hub(Hub::new_from_top(Hub::current()));

        runtime.spawn(channel);

        receiver.shared()
    }

    /// Runs `computation` for `key`, unless a computation for `key` is already in flight.
    ///
    /// In that case, `computation` is dropped without being polled, and the returned future
    /// resolves to the result of the computation in flight.
    ///
    /// Computations are spawned on the tokio runtime of the caller. Outside of a runtime, this
    /// fails with [`CacheError::InternalError`].
    pub fn run<F>(&self, key: CacheKey, computation: F) -> BoxFuture<'static, CacheEntry<T>>
    where
        F: Future<Output = CacheEntry<T>> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            tracing::error!(%key, "computation started outside of a tokio runtime");
            return Box::pin(future::ready(Err(CacheError::InternalError)));
        };

        let channel = {
            let mut current_computations = self.current_computations.lock();
            if let Some(channel) = current_computations.get(&key) {
                // A concurrent call was deduplicated.
                metric!(counter("caches.channel.hit") += 1);
                channel.clone()
            } else {
                // A concurrent call is considered new. This does not imply a cache miss.
                metric!(counter("caches.channel.miss") += 1);

                let channel = self.create_channel(&runtime, key, computation);
                let evicted = current_computations.insert(key, channel.clone());
                debug_assert!(evicted.is_none());
                metric!(gauge("caches.computations.in_flight") = current_computations.len() as u64);
                channel
            }
        };

        let future = channel.unwrap_or_else(move |_cancelled_error| {
            tracing::error!(%key, "computation channel dropped");
            Err(CacheError::InternalError)
        });

        Box::pin(future)
    }
}
