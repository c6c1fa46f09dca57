use std::fmt::{self, Write};

use sha2::{Digest, Sha256};

use super::{CacheEntry, CacheError};

/// The storage key of a cached call.
///
/// This is the sha-256 digest of the binary encoding of the request, optionally prefixed with a
/// namespace. Equal requests always produce equal keys. Collisions between different requests are
/// theoretically possible and not mitigated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    hash: [u8; 32],
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.hash {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl CacheKey {
    /// Creates a [`CacheKey`] from the request alone.
    pub fn from_request<M: prost::Message>(request: &M) -> CacheEntry<Self> {
        let mut builder = Self::builder();
        builder.write_request(request)?;
        Ok(builder.build())
    }

    /// Create a [`CacheKeyBuilder`] that can be used to scope the key before adding the request.
    pub fn builder() -> CacheKeyBuilder {
        CacheKeyBuilder {
            namespace: String::new(),
            request: Vec::new(),
        }
    }

    /// The raw digest, which is what backends use as the key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.hash
    }

    #[cfg(test)]
    pub fn for_testing(key: impl AsRef<[u8]>) -> Self {
        let hash = Sha256::digest(key.as_ref()).into();
        CacheKey { hash }
    }
}

/// A builder for [`CacheKey`]s.
///
/// This builder implements the [`Write`](std::fmt::Write) trait, which writes to the namespace of
/// the key. The namespace needs to be **stable**, for example the fully qualified method name of
/// the remote call. A builder with an empty namespace yields the same key as
/// [`CacheKey::from_request`].
#[derive(Debug)]
pub struct CacheKeyBuilder {
    namespace: String,
    request: Vec<u8>,
}

impl CacheKeyBuilder {
    /// Writes the canonical binary encoding of the request into the [`CacheKey`].
    pub fn write_request<M: prost::Message>(&mut self, request: &M) -> CacheEntry {
        self.request.reserve(request.encoded_len());
        request
            .encode(&mut self.request)
            .map_err(|err| CacheError::KeyGeneration(err.to_string()))
    }

    /// Finalize the [`CacheKey`].
    pub fn build(self) -> CacheKey {
        let mut hasher = Sha256::new();
        if !self.namespace.is_empty() {
            hasher.update(self.namespace.as_bytes());
            // the separator keeps `("ab", "c")` and `("a", "bc")` apart
            hasher.update([0]);
        }
        hasher.update(&self.request);

        CacheKey {
            hash: hasher.finalize().into(),
        }
    }
}

impl Write for CacheKeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.namespace.write_str(s)
    }
}
