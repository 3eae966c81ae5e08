//! MsgPack codec using `rmp-serde`.
//!
//! **CRITICAL**: Always use `to_vec_named`, NEVER `to_vec`!
//! The server reads payloads as maps keyed by field name (`type`, `id`, ...).
//!
//! - `to_vec` serializes structs as arrays (positional)
//! - `to_vec_named` serializes structs as maps (with field names)
//!
//! # Example
//!
//! ```
//! use squirreldb_client::codec::MsgPackCodec;
//! use squirreldb_client::protocol::ClientMessage;
//!
//! let msg = ClientMessage::Query { id: "1".to_string(), query: "db.table(\"users\").run()".to_string() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: ClientMessage = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// MessagePack codec for structured data.
///
/// Uses `rmp_serde::to_vec_named` so structs are serialized as maps
/// (with field names) rather than arrays (positional).
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns `EncodeFailed` if the value cannot be serialized.
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        // CRITICAL: to_vec_named, NOT to_vec!
        rmp_serde::to_vec_named(value).map_err(|e| Error::EncodeFailed(e.to_string()))
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns `DecodeFailed` if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::DecodeFailed(e.to_string()))
    }
}
