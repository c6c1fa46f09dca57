//! # Call caching infrastructure
//!
//! Remote calls are slow, and identical calls tend to arrive in bursts. This module wraps a single
//! request/response remote call into a [`CachedCall`], which deduplicates concurrent identical
//! calls and persists their outcome in a [`CacheBackend`] for a bounded time.
//!
//! ## Cache Layers
//!
//! - An in-memory [`Coalescer`] which deduplicates concurrent calls with the same [`CacheKey`].
//!   It does not hold on to any results once a call completes.
//! - A [`CacheBackend`], an external key/value store that persists the outcome of calls as a
//!   [`CacheRecord`]. Records expire with their TTL and are never deleted explicitly.
//!   [`InMemoryBackend`] is an adapter for tests and local use.
//!
//! A call goes through the following steps:
//! - The [`CacheKey`] is derived from the binary encoding of the request.
//! - Concurrent calls with the same key attach to the call that is already in flight.
//! - The backend is queried. Any error while doing so counts as a miss.
//! - On a hit, the record is decoded and returned. A record that does not decode fails the call.
//! - On a miss, the compute function performs the remote call, and its outcome is written back.
//!
//! ### Negative caching
//!
//! The outcome of a call is either a response, or a [`RemoteStatus`] error. Errors are persisted
//! just like responses, and are replayed as [`CallError::Cached`]. A call can restrict this to a
//! set of [`cacheable_errors`](CachedCall::cacheable_errors), other errors are then returned as
//! [`CallError::Remote`] without touching the backend.
//!
//! ### Metrics
//!
//! Here is a list of metrics that are collected:
//!
//! - `caches.access`: All calls.
//! - `caches.channel.hit`: Calls that attached to a call in flight.
//! - `caches.backend.hit`, `caches.backend.miss`, `caches.backend.error`: Backend reads.
//! - `caches.computation`: Actual remote calls being run.
//! - `caches.computation.duration`: How long the remote calls took.
//! - `caches.computations.in_flight`: The number of keys currently being computed.
//! - `caches.negative.bypass`: Errors that were not persisted.
//! - `caches.backend.write`: Records being written, tagged with a `status`.
//! - `caches.record.size`: The size (in bytes) of the written records.
//!
//! ### Configuration
//!
//! [`Config::caches`](crate::config::Config::caches) holds the TTL of records, an optional key
//! namespace, and the capacity of the [`InMemoryBackend`].

mod backend;
mod cache_error;
mod cache_key;
mod cacher;
mod coalesce;
mod record;
mod session;
mod status;


pub use backend::{CacheBackend, InMemoryBackend};
pub use cache_error::{CacheEntry, CacheError, CallError};
pub use cache_key::{CacheKey, CacheKeyBuilder};
pub use cacher::{CachedCall, CallGroup};
pub use coalesce::Coalescer;
pub use record::CacheRecord;
pub use session::Session;
pub use status::{Code, RemoteStatus, Status};
