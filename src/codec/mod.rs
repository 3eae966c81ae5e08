//! Codec module - serialization/deserialization for payloads.
//!
//! This module provides one codec per wire encoding tag:
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`, structs as maps)
//! - [`JsonCodec`] - JSON text using `serde_json`
//!
//! Outgoing payloads use the session's negotiated encoding. Incoming payloads are
//! decoded according to the encoding tag of the frame that carried them.
//!
//! # Design
//!
//! Codecs are implemented as marker structs with static methods rather than trait objects;
//! [`encode`] and [`decode`] pick one from an [`Encoding`] at runtime.
//!
//! # Example
//!
//! ```
//! use squirreldb_client::codec;
//! use squirreldb_client::protocol::Encoding;
//!
//! let encoded = codec::encode(Encoding::Json, &vec!["users", "orders"]).unwrap();
//! assert_eq!(encoded, br#"["users","orders"]"#);
//!
//! let decoded: Vec<String> = codec::decode(Encoding::Json, &encoded).unwrap();
//! assert_eq!(decoded, vec!["users", "orders"]);
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::protocol::Encoding;

/// Encode `value` with the given encoding.
#[inline]
pub fn encode<T: Serialize + ?Sized>(encoding: Encoding, value: &T) -> Result<Vec<u8>> {
    match encoding {
        Encoding::MessagePack => MsgPackCodec::encode(value),
        Encoding::Json => JsonCodec::encode(value),
    }
}

/// Decode `bytes` with the given encoding.
#[inline]
pub fn decode<T: DeserializeOwned>(encoding: Encoding, bytes: &[u8]) -> Result<T> {
    match encoding {
        Encoding::MessagePack => MsgPackCodec::decode(bytes),
        Encoding::Json => JsonCodec::decode(bytes),
    }
}
