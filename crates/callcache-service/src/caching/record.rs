use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{CacheEntry, CacheError};

/// The persisted outcome of a call, as written to the cache backend.
///
/// The request is not part of the record, it is only represented through the [`CacheKey`](super::CacheKey).
/// On the wire, this is a JSON object with the response payload in standard base64:
///
/// ```json
/// {"payload":"CgRoYWhh","code":0,"message":""}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// The binary encoding of the response, empty if there was none.
    #[serde(with = "payload", default)]
    pub payload: Vec<u8>,
    /// The status code of the error, `0` if the call succeeded.
    #[serde(default)]
    pub code: i32,
    /// The message of the error.
    #[serde(default)]
    pub message: String,
}

impl CacheRecord {
    /// Frames the record into the bytes that are stored in the backend.
    pub fn to_bytes(&self) -> CacheEntry<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|err| CacheError::Serialization(err.to_string()))
    }

    /// Parses a framed record.
    pub fn from_slice(bytes: &[u8]) -> CacheEntry<Self> {
        serde_json::from_slice(bytes).map_err(|err| CacheError::Deserialization(err.to_string()))
    }
}

mod payload {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD.decode(encoded).map_err(de::Error::custom)
    }
}
