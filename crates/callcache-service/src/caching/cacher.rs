use std::fmt::Write;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use super::{
    CacheBackend, CacheEntry, CacheError, CacheKey, CallError, Coalescer, RemoteStatus, Session,
    Status,
};

/// The [`Coalescer`] that deduplicates concurrent [`CachedCall`]s of the same kind.
pub type CallGroup<Req, Resp, E = Status> = Coalescer<Session<Req, Resp, E>>;

/// A single remote call, served through a cache backend.
///
/// Calling [`get`](Self::get) derives a [`CacheKey`] from the request and looks it up in the
/// backend. On a miss, the compute function performs the actual remote call, and its outcome is
/// written back for the configured TTL. Concurrent calls with equal requests that share a
/// [`CallGroup`] are deduplicated, so only one of them reads from the backend, invokes the compute
/// function and writes the record.
///
/// Failures of the remote call are cached as well. With
/// [`cacheable_errors`](Self::cacheable_errors) this is restricted to the listed errors, any other
/// error is returned without being persisted.
pub struct CachedCall<Req, Resp, E, F> {
    backend: Arc<dyn CacheBackend>,
    compute: F,
    session: Session<Req, Resp, E>,
    group: CallGroup<Req, Resp, E>,
    ttl: Duration,
    cacheable_errors: Vec<E>,
    namespace: Option<String>,
}

impl<Req, Resp, E, F, Fut> CachedCall<Req, Resp, E, F>
where
    Req: prost::Message + Clone + 'static,
    Resp: prost::Message + Default + Clone + 'static,
    E: RemoteStatus + PartialEq,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
{
    /// Creates a new call.
    ///
    /// The `session` carries the request, and optionally a placeholder response that is returned
    /// alongside errors of the remote call.
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        compute: F,
        session: Session<Req, Resp, E>,
        group: CallGroup<Req, Resp, E>,
        ttl: Duration,
    ) -> Self {
        Self {
            backend,
            compute,
            session,
            group,
            ttl,
            cacheable_errors: Vec::new(),
            namespace: None,
        }
    }

    /// Restricts negative caching to the given errors.
    ///
    /// An error of the remote call is only persisted if it is equal to one of these. Without
    /// any, all errors are persisted.
    pub fn cacheable_errors(mut self, errors: impl IntoIterator<Item = E>) -> Self {
        self.cacheable_errors.extend(errors);
        self
    }

    /// Scopes the cache key with the given namespace, usually the name of the remote method.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Performs the call, serving it from the cache if possible.
    ///
    /// Returns [`CallError::Remote`] if the remote call failed just now, and [`CallError::Cached`]
    /// if the failure was replayed from the cache. Failures of the caching machinery itself are
    /// fatal for the call and are not retried.
    ///
    /// This has to be awaited within a tokio runtime, which runs the shared computation. Outside
    /// of one, the call fails with [`CacheError::InternalError`].
    pub async fn get(self) -> Result<Resp, CallError<E>> {
        let key = self.cache_key()?;
        metric!(counter("caches.access") += 1);

        let group = self.group.clone();
        let span = tracing::debug_span!("cached_call", %key);
        let session = group
            .run(key, self.compute_session(key).instrument(span))
            .await?;

        let cached = session.is_cached();
        session.outcome().map_err(|error| {
            if cached {
                CallError::Cached(error)
            } else {
                CallError::Remote(error)
            }
        })
    }

    fn cache_key(&self) -> CacheEntry<CacheKey> {
        let mut builder = CacheKey::builder();
        if let Some(namespace) = &self.namespace {
            builder
                .write_str(namespace)
                .map_err(|err| CacheError::KeyGeneration(err.to_string()))?;
        }
        builder.write_request(self.session.request())?;
        Ok(builder.build())
    }

    /// Reads the outcome from the backend, or computes and writes it.
    ///
    /// This is the body that runs at most once for all concurrent calls with the same key.
    async fn compute_session(self, key: CacheKey) -> CacheEntry<Session<Req, Resp, E>> {
        let Self {
            backend,
            compute,
            mut session,
            ttl,
            cacheable_errors,
            ..
        } = self;

        match backend.get_bytes(&key).await {
            Ok(Some(bytes)) => {
                metric!(counter("caches.backend.hit") += 1);
                tracing::trace!("Loading cached call outcome");
                if let Err(err) = session.deserialize(&bytes) {
                    tracing::error!(error = %err, "Failed to restore cached call outcome");
                    return Err(err);
                }
                return Ok(session);
            }
            Ok(None) => {
                metric!(counter("caches.backend.miss") += 1);
                tracing::trace!("No cached call outcome");
            }
            Err(err) => {
                metric!(counter("caches.backend.error") += 1);
                tracing::debug!("Failed to read from cache backend: {err:#}");
            }
        }

        metric!(counter("caches.computation") += 1);
        let start = Instant::now();
        let result = compute().await;
        metric!(timer("caches.computation.duration") = start.elapsed());

        let (request, placeholder, _) = session.into_parts();
        let (response, error) = match result {
            Ok(response) => (Some(response), None),
            Err(error) => (placeholder, Some(error)),
        };

        let bypass = error.as_ref().is_some_and(|error| {
            !cacheable_errors.is_empty() && !cacheable_errors.contains(error)
        });
        if bypass {
            metric!(counter("caches.negative.bypass") += 1);
            tracing::trace!("Not caching error outside of the cacheable errors");
            return Ok(Session::with_outcome(request, response, error));
        }

        let session = Session::with_outcome(request, response, error);
        let result = write_through(backend.as_ref(), key, &session, ttl).await;
        metric!(
            counter("caches.backend.write") += 1,
            "status" => result.as_ref().map_or_else(CacheError::metrics_tag, |_| "ok"),
        );
        result?;

        Ok(session)
    }
}

async fn write_through<Req, Resp, E>(
    backend: &dyn CacheBackend,
    key: CacheKey,
    session: &Session<Req, Resp, E>,
    ttl: Duration,
) -> CacheEntry
where
    Req: prost::Message,
    Resp: prost::Message + Default,
    E: RemoteStatus,
{
    let bytes = session.serialize()?;
    metric!(time_raw("caches.record.size") = bytes.len() as u64);

    backend.set_bytes(&key, bytes, ttl).await.map_err(|err| {
        tracing::error!("Failed to write call outcome to cache backend: {err:#}");
        CacheError::Backend(format!("{err:#}"))
    })
}
