//! JSON codec using `serde_json`.
//!
//! JSON is the fallback encoding every server must accept.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// JSON codec for structured data.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EncodeFailed` if the value cannot be serialized.
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::EncodeFailed(e.to_string()))
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns `DecodeFailed` if the bytes are not valid JSON for type T.
    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::DecodeFailed(e.to_string()))
    }
}
