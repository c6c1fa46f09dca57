use thiserror::Error;

/// An infrastructure failure while serving a cached call.
///
/// None of these are outcomes of the remote call itself, see [`CallError`] for those. The type
/// is cheap to clone, as one error is handed to every caller of a coalesced computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The caller supplied an unusable value, for example a session without a request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The request could not be encoded to derive its cache key.
    #[error("failed to generate cache key: {0}")]
    KeyGeneration(String),
    /// The response could not be encoded into its binary payload.
    #[error("failed to encode response: {0}")]
    Encoding(String),
    /// The cache record could not be framed.
    #[error("failed to serialize cache record: {0}")]
    Serialization(String),
    /// A cache record read from the backend is malformed, or does not match the response type.
    ///
    /// The offending entry is left in place and expires with its TTL.
    #[error("failed to deserialize cache record: {0}")]
    Deserialization(String),
    /// Writing the record to the backend failed.
    #[error("cache backend error: {0}")]
    Backend(String),
    /// An unexpected error, like a computation that died without producing a result.
    #[error("internal error")]
    InternalError,
}

impl CacheError {
    /// The value used for the `status` tag of metrics.
    pub fn metrics_tag(&self) -> &'static str {
        match self {
            CacheError::InvalidArgument(_) => "invalid-argument",
            CacheError::KeyGeneration(_) => "key-generation",
            CacheError::Encoding(_) => "encoding",
            CacheError::Serialization(_) => "serialization",
            CacheError::Deserialization(_) => "deserialization",
            CacheError::Backend(_) => "backend",
            CacheError::InternalError => "internal",
        }
    }
}

/// The result of some piece of the caching machinery.
pub type CacheEntry<T = ()> = Result<T, CacheError>;

/// The error side of a cached call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError<E> {
    /// The remote call failed during this call.
    ///
    /// Depending on the negative caching policy this error was persisted or not.
    #[error("remote call failed: {0}")]
    Remote(E),
    /// A remote call failure that was persisted earlier and replayed from the cache.
    #[error("remote call failed (cached): {0}")]
    Cached(E),
    /// The caching machinery itself failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl<E> CallError<E> {
    /// Returns the error of the remote call, regardless of whether it was replayed from the cache.
    pub fn remote_error(&self) -> Option<&E> {
        match self {
            CallError::Remote(err) | CallError::Cached(err) => Some(err),
            CallError::Cache(_) => None,
        }
    }

    /// Converts into the error of the remote call, or the caching failure.
    pub fn into_remote_error(self) -> Result<E, CacheError> {
        match self {
            CallError::Remote(err) | CallError::Cached(err) => Ok(err),
            CallError::Cache(err) => Err(err),
        }
    }

    /// Whether this error was replayed from the cache.
    pub fn is_cached(&self) -> bool {
        matches!(self, CallError::Cached(_))
    }
}
