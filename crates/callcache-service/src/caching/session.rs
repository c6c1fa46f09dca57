use bytes::Bytes;

use super::{CacheEntry, CacheError, CacheRecord, RemoteStatus, Status};

/// The envelope of a single remote call: the request, and the outcome once there is one.
///
/// The response type doubles as the prototype that persisted payloads are decoded into, so a
/// session always knows the concrete shape of the response it expects.
#[derive(Debug, Clone, PartialEq)]
pub struct Session<Req, Resp, E = Status> {
    request: Req,
    response: Option<Resp>,
    error: Option<E>,
    cached: bool,
}

impl<Req, Resp, E> Session<Req, Resp, E>
where
    Req: prost::Message,
    Resp: prost::Message + Default,
    E: RemoteStatus,
{
    /// Creates a session for `request` that has no outcome yet.
    pub fn new(request: Req) -> Self {
        Self::with_outcome(request, None, None)
    }

    /// Creates a session from its optional parts.
    ///
    /// Fails with [`CacheError::InvalidArgument`] if there is no request, as there would be
    /// nothing to derive the cache key from. A missing response is fine.
    pub fn try_new(
        request: Option<Req>,
        response: Option<Resp>,
        error: Option<E>,
    ) -> CacheEntry<Self> {
        let request =
            request.ok_or_else(|| CacheError::InvalidArgument("session has no request".into()))?;

        Ok(Self::with_outcome(request, response, error))
    }

    /// Creates a session that carries the outcome of a call.
    pub(crate) fn with_outcome(request: Req, response: Option<Resp>, error: Option<E>) -> Self {
        Self {
            request,
            response,
            error,
            cached: false,
        }
    }

    pub(crate) fn into_parts(self) -> (Req, Option<Resp>, Option<E>) {
        (self.request, self.response, self.error)
    }

    pub fn request(&self) -> &Req {
        &self.request
    }

    pub fn response(&self) -> Option<&Resp> {
        self.response.as_ref()
    }

    pub fn error(&self) -> Option<&E> {
        self.error.as_ref()
    }

    /// Whether the outcome of this session was restored from a [`CacheRecord`].
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Serializes the outcome of this session into a framed [`CacheRecord`].
    ///
    /// The request is not serialized. A session without a response produces an empty payload.
    pub fn serialize(&self) -> CacheEntry<Bytes> {
        let mut record = CacheRecord::default();

        if let Some(response) = &self.response {
            record.payload.reserve(response.encoded_len());
            response
                .encode(&mut record.payload)
                .map_err(|err| CacheError::Encoding(err.to_string()))?;
        }

        if let Some(error) = &self.error {
            let code = error.code();
            if code == E::OK {
                // this would be restored as a success
                return Err(CacheError::Encoding(format!(
                    "error `{}` carries the success code",
                    error.message()
                )));
            }
            record.code = code;
            record.message = error.message();
        }

        record.to_bytes()
    }

    /// Restores the outcome of this session from a framed [`CacheRecord`].
    ///
    /// The payload is decoded into a fresh `Resp`, replacing the current response. The error is
    /// restored through [`RemoteStatus::from_parts`], so a success code clears it. On failure, the
    /// session is left untouched.
    pub fn deserialize(&mut self, bytes: &[u8]) -> CacheEntry {
        let record = CacheRecord::from_slice(bytes)?;
        let response = Resp::decode(record.payload.as_slice())
            .map_err(|err| CacheError::Deserialization(err.to_string()))?;

        self.response = Some(response);
        self.error = E::from_parts(record.code, record.message);
        self.cached = true;
        Ok(())
    }

    /// Resolves the session into either its response or its error.
    ///
    /// The error takes precedence over any response. A session without either resolves to the
    /// default response.
    pub fn outcome(self) -> Result<Resp, E> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.response.unwrap_or_default()),
        }
    }
}
