//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use squirreldb_client::protocol::{encode_frame, Encoding, FrameBuffer, MessageType};
//!
//! let bytes = encode_frame(MessageType::Response, Encoding::Json, b"{}").unwrap();
//! let mut buffer = FrameBuffer::new();
//! let frames = buffer.push(&bytes).unwrap();
//!
//! assert_eq!(frames[0].message_type(), Some(MessageType::Response));
//! assert_eq!(frames[0].payload(), b"{}");
//! ```

use bytes::Bytes;

use super::wire_format::{Encoding, Header, MessageType, HEADER_SIZE};
use crate::error::Result;

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Typed message type, if known.
    #[inline]
    pub fn message_type(&self) -> Option<MessageType> {
        self.header.message_type()
    }

    /// Typed payload encoding, if known.
    #[inline]
    pub fn encoding(&self) -> Option<Encoding> {
        self.header.encoding()
    }

    /// Check if the frame is flagged as a server push.
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.message_type() == Some(MessageType::Notification)
    }
}

/// Encode a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use squirreldb_client::protocol::{encode_frame, Encoding, MessageType, HEADER_SIZE};
///
/// let bytes = encode_frame(MessageType::Request, Encoding::MessagePack, b"hello").unwrap();
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// assert_eq!(&bytes[..4], &[0, 0, 0, 7]);
/// ```
pub fn encode_frame(
    message_type: MessageType,
    encoding: Encoding,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let header = Header::for_payload(message_type, encoding, payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    Ok(buf)
}
